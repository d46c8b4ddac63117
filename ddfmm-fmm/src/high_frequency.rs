//! The high-frequency pass (§4.6): HF-M2M, HF-M2L, HF-L2L, operating on
//! `(box, direction)` keys at levels `< U` (box width `> 1`).

use ddfmm_geometry::direction::{direction as quantize_direction, enumerate_directions, parent_direction};
use ddfmm_geometry::{BoxDirKey, BoxKey, Index3};
use ddfmm_traits::{Complex64, Gemv, Kernel, Mlib};
use ddfmm_tree::{BoxDirData, Hierarchy};
use rayon::prelude::*;
use std::collections::HashMap;

/// HF-M2M at `level` (the parent level, `< U`): translates each occupied
/// child's upward density into the parent's directional upward check
/// value, then converts to an equivalent density. Children at the unit
/// level contribute their plain (non-directional) density to every
/// direction of the parent; children already in the high-frequency regime
/// contribute only to their own parent direction.
pub fn hf_m2m(
    hierarchy: &Hierarchy,
    boxdir: &HashMap<BoxDirKey, BoxDirData>,
    level: u32,
    mlib: &dyn Mlib,
    gemv: &dyn Gemv,
) -> HashMap<BoxDirKey, Vec<Complex64>> {
    let parent_width = ddfmm_geometry::box_width(hierarchy.k, level);
    let unit_level = hierarchy.unit_level();
    let mut out = HashMap::new();

    for (&key, _data) in hierarchy.boxes.iter().filter(|(k, _)| k.level == level) {
        if level + 1 == unit_level {
            for dir in enumerate_directions(parent_width) {
                let ops = mlib.lookup(parent_width, Some(dir));
                let mut check = vec![Complex64::new(0.0, 0.0); ops.child_op_rows];
                let mut any = false;
                for child in key.children() {
                    if let Some(child_data) = hierarchy.boxes.get(&child) {
                        if child_data.upward_equivalent_density.is_empty() {
                            continue;
                        }
                        any = true;
                        accumulate(gemv, &ops.ue2uc[child.sibling_index()], ops.child_op_rows, ops.child_op_cols, &child_data.upward_equivalent_density, &mut check);
                    }
                }
                if any {
                    let density = ops.uc2ue.apply(gemv, &check);
                    out.insert(BoxDirKey::new(key, dir), density);
                }
            }
        } else {
            let mut by_parent_dir: HashMap<Index3, Vec<(BoxKey, Index3)>> = HashMap::new();
            for child in key.children() {
                let child_width = ddfmm_geometry::box_width(hierarchy.k, level + 1);
                for (&bdk, bdd) in boxdir.iter() {
                    if bdk.boxkey != child || bdd.upward_equivalent_density.is_empty() {
                        continue;
                    }
                    let pdir = parent_direction(bdk.direction, child_width);
                    by_parent_dir.entry(pdir).or_default().push((child, bdk.direction));
                }
            }
            for (pdir, contributors) in by_parent_dir {
                let ops = mlib.lookup(parent_width, Some(pdir));
                let mut check = vec![Complex64::new(0.0, 0.0); ops.child_op_rows];
                for (child, child_dir) in contributors {
                    let bdd = &boxdir[&BoxDirKey::new(child, child_dir)];
                    accumulate(gemv, &ops.ue2uc[child.sibling_index()], ops.child_op_rows, ops.child_op_cols, &bdd.upward_equivalent_density, &mut check);
                }
                let density = ops.uc2ue.apply(gemv, &check);
                out.insert(BoxDirKey::new(key, pdir), density);
            }
        }
    }
    out
}

/// HF-M2L at `level`: for every target `(box, dir)`, iterates the
/// directional E-list, asserting (§4.6) that each source's center-
/// separation direction really is `dir`, and accumulates the kernel
/// evaluated between directional equivalent/check surfaces.
pub fn hf_m2l(
    hierarchy: &Hierarchy,
    boxdir: &HashMap<BoxDirKey, BoxDirData>,
    level: u32,
    kernel: &dyn Kernel,
    gemv: &dyn Gemv,
    npq: usize,
) -> HashMap<BoxDirKey, Vec<Complex64>> {
    let width = ddfmm_geometry::box_width(hierarchy.k, level);

    let level_keys: Vec<BoxKey> = hierarchy.boxes.keys().copied().filter(|k| k.level == level).collect();

    level_keys
        .into_par_iter()
        .flat_map_iter(|key| {
            let data = &hierarchy.boxes[&key];
            data.lists.e.iter().map(move |(&dir, sources)| {
                let target_center = hierarchy.box_center(&key);
                let target_half_width = hierarchy.box_half_width(&key);
                let check_surface = crate::surfaces::downward_check_surface(target_center, target_half_width, npq);
                let mut acc = vec![Complex64::new(0.0, 0.0); check_surface.len()];

                for &src in sources {
                    let observed = quantize_direction(&target_center.sub(&hierarchy.box_center(&src)), width);
                    assert_eq!(
                        observed, dir,
                        "E-list source {:?} does not map to its bucketed direction",
                        src
                    );
                    let key_with_dir = BoxDirKey::new(src, dir);
                    let Some(src_data) = boxdir.get(&key_with_dir) else {
                        continue;
                    };
                    if src_data.upward_equivalent_density.is_empty() {
                        continue;
                    }
                    let src_surface = crate::surfaces::upward_equivalent_surface(
                        hierarchy.box_center(&src),
                        hierarchy.box_half_width(&src),
                        npq,
                    );
                    let contrib = kernel_apply(kernel, gemv, &check_surface, &src_surface, &src_data.upward_equivalent_density);
                    for (a, b) in acc.iter_mut().zip(contrib.iter()) {
                        *a += b;
                    }
                }
                (BoxDirKey::new(key, dir), acc)
            })
        })
        .collect()
}

/// HF-L2L at `level` (the parent/source level of the downward pass,
/// `< U`): converts each `(box, dir)` incoming check value to a directional
/// downward equivalent density, then distributes it to occupied children —
/// directionally if they remain in the high-frequency regime, or into the
/// next (unit) level's plain check value if `level + 1 == U`.
pub fn hf_l2l(
    hierarchy: &Hierarchy,
    boxdir: &HashMap<BoxDirKey, BoxDirData>,
    level: u32,
    mlib: &dyn Mlib,
    gemv: &dyn Gemv,
) -> (HashMap<BoxDirKey, Vec<Complex64>>, HashMap<BoxKey, Vec<Complex64>>) {
    let width = ddfmm_geometry::box_width(hierarchy.k, level);
    let unit_level = hierarchy.unit_level();
    let mut directional_out = HashMap::new();
    let mut plain_out = HashMap::new();

    for (&key, data) in boxdir.iter().filter(|(k, _)| k.boxkey.level == level) {
        if data.downward_check_value.is_empty() {
            continue;
        }
        let ops = mlib.lookup(width, Some(key.direction));
        let equivalent = ops.dc2de.apply(gemv, &data.downward_check_value);

        let box_key = key.boxkey;
        if level + 1 == unit_level {
            for child in box_key.children() {
                if !hierarchy.boxes.contains_key(&child) {
                    continue;
                }
                let op = &ops.de2dc[child.sibling_index()];
                let mut contrib = vec![Complex64::new(0.0, 0.0); ops.child_op_rows];
                gemv.gemv(
                    Complex64::new(1.0, 0.0),
                    op,
                    ops.child_op_rows,
                    ops.child_op_cols,
                    &equivalent,
                    Complex64::new(0.0, 0.0),
                    &mut contrib,
                );
                plain_out
                    .entry(child)
                    .or_insert_with(|| vec![Complex64::new(0.0, 0.0); ops.child_op_rows])
                    .iter_mut()
                    .zip(contrib.iter())
                    .for_each(|(a, b)| *a += *b);
            }
        } else {
            let child_width = ddfmm_geometry::box_width(hierarchy.k, level + 1);
            for child in box_key.children() {
                if !hierarchy.boxes.contains_key(&child) {
                    continue;
                }
                for child_dir in enumerate_directions(child_width) {
                    if parent_direction(child_dir, child_width) != key.direction {
                        continue;
                    }
                    let op = &ops.de2dc[child.sibling_index()];
                    let mut contrib = vec![Complex64::new(0.0, 0.0); ops.child_op_rows];
                    gemv.gemv(
                        Complex64::new(1.0, 0.0),
                        op,
                        ops.child_op_rows,
                        ops.child_op_cols,
                        &equivalent,
                        Complex64::new(0.0, 0.0),
                        &mut contrib,
                    );
                    let entry = directional_out
                        .entry(BoxDirKey::new(child, child_dir))
                        .or_insert_with(|| vec![Complex64::new(0.0, 0.0); ops.child_op_rows]);
                    for (a, b) in entry.iter_mut().zip(contrib.iter()) {
                        *a += *b;
                    }
                }
            }
        }
    }
    (directional_out, plain_out)
}

fn accumulate(
    gemv: &dyn Gemv,
    op: &[Complex64],
    rows: usize,
    cols: usize,
    input: &[Complex64],
    acc: &mut [Complex64],
) {
    let mut contrib = vec![Complex64::new(0.0, 0.0); rows];
    gemv.gemv(Complex64::new(1.0, 0.0), op, rows, cols, input, Complex64::new(0.0, 0.0), &mut contrib);
    for (a, b) in acc.iter_mut().zip(contrib.iter()) {
        *a += *b;
    }
}

fn kernel_apply(
    kernel: &dyn Kernel,
    gemv: &dyn Gemv,
    targets: &[ddfmm_geometry::Vector3],
    sources: &[ddfmm_geometry::Vector3],
    density: &[Complex64],
) -> Vec<Complex64> {
    let m = kernel.evaluate(targets, sources);
    let mut out = vec![Complex64::new(0.0, 0.0); targets.len()];
    gemv.gemv(
        Complex64::new(1.0, 0.0),
        &m,
        targets.len(),
        sources.len(),
        density,
        Complex64::new(0.0, 0.0),
        &mut out,
    );
    out
}

//! The low-frequency pass (§4.5): L-M2M, L-M2L via U/V/W/X lists with an
//! FFT-accelerated V-list, and L-L2L. Operates on boxes at levels `>= U`
//! (box width `<= 1`, no direction needed).

use crate::surfaces::{downward_check_surface, downward_equivalent_surface, upward_check_surface};
use ddfmm_geometry::{BoxKey, Index3, Vector3};
use ddfmm_traits::{Complex64, Fft, Gemv, Kernel, Mlib};
use ddfmm_tree::Hierarchy;
use rayon::prelude::*;
use std::collections::HashMap;

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

/// L-M2M at `level`: computes every occupied box's upward equivalent
/// density from its sources (terminal) or occupied children (internal).
/// Returns the new densities; the caller commits them into the hierarchy.
pub fn l_m2m(
    hierarchy: &Hierarchy,
    level: u32,
    mlib: &dyn Mlib,
    gemv: &dyn Gemv,
    kernel: &dyn Kernel,
    npq: usize,
) -> HashMap<BoxKey, Vec<Complex64>> {
    let width = ddfmm_geometry::box_width(hierarchy.k, level);
    let ops = mlib.lookup(width, None);

    let level_boxes: Vec<BoxKey> = hierarchy.boxes.keys().copied().filter(|k| k.level == level).collect();

    level_boxes
        .into_par_iter()
        .map(|key| {
        let data = &hierarchy.boxes[&key];
        let center = hierarchy.box_center(&key);
        let half_width = hierarchy.box_half_width(&key);
        let check_surface = upward_check_surface(center, half_width, npq);

        let check = if data.terminal {
            kernel_apply(
                kernel,
                gemv,
                &check_surface,
                &data.source_positions,
                &data.source_densities,
            )
        } else {
            let mut acc = vec![Complex64::new(0.0, 0.0); check_surface.len()];
            for child in key.children() {
                if let Some(child_data) = hierarchy.boxes.get(&child) {
                    if child_data.upward_equivalent_density.is_empty() {
                        continue;
                    }
                    let op = &ops.ue2uc[child.sibling_index()];
                    let mut contrib = vec![Complex64::new(0.0, 0.0); ops.child_op_rows];
                    gemv.gemv(
                        Complex64::new(1.0, 0.0),
                        op,
                        ops.child_op_rows,
                        ops.child_op_cols,
                        &child_data.upward_equivalent_density,
                        Complex64::new(0.0, 0.0),
                        &mut contrib,
                    );
                    for (a, b) in acc.iter_mut().zip(contrib.iter()) {
                        *a += b;
                    }
                }
            }
            acc
        };

        let density = ops.uc2ue.apply(gemv, &check);
        (key, density)
        })
        .collect()
}

/// L-L2L at `level`: distributes a parent's downward check value into each
/// occupied child's downward check value (internal), or applies it at the
/// target points (terminal). Returns both the per-child check-value
/// contributions and the per-terminal-box target-value contributions.
pub fn l_l2l(
    hierarchy: &Hierarchy,
    level: u32,
    mlib: &dyn Mlib,
    gemv: &dyn Gemv,
    kernel: &dyn Kernel,
    npq: usize,
) -> (HashMap<BoxKey, Vec<Complex64>>, HashMap<BoxKey, Vec<Complex64>>) {
    let width = ddfmm_geometry::box_width(hierarchy.k, level);
    let ops = mlib.lookup(width, None);

    let level_boxes: Vec<BoxKey> = hierarchy.boxes.keys().copied().filter(|k| k.level == level).collect();

    let per_box: Vec<(Vec<(BoxKey, Vec<Complex64>)>, Vec<(BoxKey, Vec<Complex64>)>)> = level_boxes
        .into_par_iter()
        .filter_map(|key| {
            let data = &hierarchy.boxes[&key];
            if data.downward_check_value.is_empty() {
                return None;
            }
            let equivalent = ops.dc2de.apply(gemv, &data.downward_check_value);

            if data.terminal {
                let center = hierarchy.box_center(&key);
                let half_width = hierarchy.box_half_width(&key);
                let eq_surface = downward_equivalent_surface(center, half_width, npq);
                let values = kernel_apply(kernel, gemv, &data.target_positions, &eq_surface, &equivalent);
                Some((Vec::new(), vec![(key, values)]))
            } else {
                let mut children = Vec::new();
                for child in key.children() {
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
                    children.push((child, contrib));
                }
                Some((children, Vec::new()))
            }
        })
        .collect();

    let mut child_check_contrib = HashMap::new();
    let mut target_contrib = HashMap::new();
    for (children, targets) in per_box {
        child_check_contrib.extend(children);
        target_contrib.extend(targets);
    }
    (child_check_contrib, target_contrib)
}

/// L-M2L at `level`: U/V/W/X list contributions. U-list writes directly
/// into target particle values; V/W/X accumulate into the downward check
/// value. Returns `(target_value_deltas, downward_check_deltas)`.
///
/// The V-list is FFT-accelerated (§4.5): each source's upward equivalent
/// density is stamped onto a `(2P)^3` grid and forward-transformed once
/// (`FftCache`, freed after `fftnum` consumers via `record_use`); the
/// transform is multiplied pointwise by the interaction tensor for the
/// pair's integer box separation, summed across the target's V-list, then
/// inverse-transformed and sampled at the check surface's grid cells.
pub fn l_m2l(
    hierarchy: &mut Hierarchy,
    level: u32,
    mlib: &dyn Mlib,
    gemv: &dyn Gemv,
    kernel: &dyn Kernel,
    fft: &mut dyn Fft,
    npq: usize,
) -> (HashMap<BoxKey, Vec<Complex64>>, HashMap<BoxKey, Vec<Complex64>>) {
    let width = ddfmm_geometry::box_width(hierarchy.k, level);
    let _ops = mlib.lookup(width, None);

    let mut target_deltas: HashMap<BoxKey, Vec<Complex64>> = HashMap::new();
    let mut check_deltas: HashMap<BoxKey, Vec<Complex64>> = HashMap::new();

    let level_boxes: Vec<BoxKey> = hierarchy
        .boxes
        .keys()
        .copied()
        .filter(|k| k.level == level)
        .collect();

    let mut v_check_acc = v_list_fft_sweep(hierarchy, &level_boxes, level, kernel, fft, npq);

    for &key in &level_boxes {
        let data = &hierarchy.boxes[&key];
        let check_surface = downward_check_surface(hierarchy.box_center(&key), hierarchy.box_half_width(&key), npq);
        let mut check_acc = vec![Complex64::new(0.0, 0.0); check_surface.len()];

        // U-list: direct particle-to-particle evaluation.
        if data.terminal {
            let mut tgt_acc = vec![Complex64::new(0.0, 0.0); data.target_positions.len()];
            for u in &data.lists.u {
                if let Some(src) = hierarchy.boxes.get(u) {
                    let contrib = kernel_apply(
                        kernel,
                        gemv,
                        &data.target_positions,
                        &src.source_positions,
                        &src.source_densities,
                    );
                    for (a, b) in tgt_acc.iter_mut().zip(contrib.iter()) {
                        *a += b;
                    }
                }
            }
            if !tgt_acc.iter().all(|v| v.norm() == 0.0) {
                target_deltas.insert(key, tgt_acc);
            }
        }

        // V-list: the FFT-accelerated contribution computed by
        // `v_list_fft_sweep` above.
        if let Some(v_contrib) = v_check_acc.remove(&key) {
            for (a, b) in check_acc.iter_mut().zip(v_contrib.iter()) {
                *a += b;
            }
        }

        // W-list: coarser near-source, direct if sparse terminal, else via
        // the neighbor's upward equivalent surface.
        for w in &data.lists.w {
            if let Some(src) = hierarchy.boxes.get(w) {
                let contrib = if src.sparse() {
                    kernel_apply(kernel, gemv, &check_surface, &src.source_positions, &src.source_densities)
                } else if !src.upward_equivalent_density.is_empty() {
                    let src_surface = crate::surfaces::upward_equivalent_surface(
                        hierarchy.box_center(w),
                        hierarchy.box_half_width(w),
                        npq,
                    );
                    kernel_apply(kernel, gemv, &check_surface, &src_surface, &src.upward_equivalent_density)
                } else {
                    continue;
                };
                for (a, b) in check_acc.iter_mut().zip(contrib.iter()) {
                    *a += b;
                }
            }
        }

        // X-list: finer near-source, direct if target is a sparse terminal,
        // else applied onto the target's own downward check positions.
        if data.terminal && data.sparse() {
            let mut tgt_acc = target_deltas.remove(&key).unwrap_or_else(|| {
                vec![Complex64::new(0.0, 0.0); data.target_positions.len()]
            });
            for x in &data.lists.x {
                if let Some(src) = hierarchy.boxes.get(x) {
                    let contrib = kernel_apply(
                        kernel,
                        gemv,
                        &data.target_positions,
                        &src.source_positions,
                        &src.source_densities,
                    );
                    for (a, b) in tgt_acc.iter_mut().zip(contrib.iter()) {
                        *a += b;
                    }
                }
            }
            target_deltas.insert(key, tgt_acc);
        } else {
            for x in &data.lists.x {
                if let Some(src) = hierarchy.boxes.get(x) {
                    let contrib = kernel_apply(kernel, gemv, &check_surface, &src.source_positions, &src.source_densities);
                    for (a, b) in check_acc.iter_mut().zip(contrib.iter()) {
                        *a += b;
                    }
                }
            }
        }

        if !check_acc.iter().all(|v| v.norm() == 0.0) {
            check_deltas.insert(key, check_acc);
        }
    }

    (target_deltas, check_deltas)
}

/// Grid cell each of a `(2P)^3`-grid-relative equivalent/check surface's
/// `6*npq^2` sample points stamps into, in `cube_surface`'s emission order.
/// Shared by the upward-equivalent stamp and the downward-check sample
/// since both surfaces have the same `npq` and radius (§4.5).
fn surface_cells(npq: usize, side: usize) -> Vec<(usize, usize, usize)> {
    let npq = npq.max(2);
    let offset = side.saturating_sub(npq) / 2;
    crate::surfaces::cube_surface(Vector3::zero(), 1.0, npq)
        .iter()
        .map(|p| {
            let cell = |c: f64| {
                let local = ((c + 1.0) / 2.0 * (npq - 1) as f64).round() as usize;
                (local + offset).min(side - 1)
            };
            (cell(p.x), cell(p.y), cell(p.z))
        })
        .collect()
}

fn flat(side: usize, a: usize, b: usize, c: usize) -> usize {
    (a * side + b) * side + c
}

/// Stamps a density vector onto the `(2P)^3` grid at the surface's cells.
fn stamp(density: &[Complex64], cells: &[(usize, usize, usize)], side: usize) -> Vec<Complex64> {
    let mut grid = vec![Complex64::new(0.0, 0.0); side * side * side];
    for (&(a, b, c), &d) in cells.iter().zip(density.iter()) {
        grid[flat(side, a, b, c)] += d;
    }
    grid
}

/// Reads the grid back at the surface's cells, applying the `1/(2P)^3`
/// inverse-transform scale.
fn sample(grid: &[Complex64], cells: &[(usize, usize, usize)], side: usize, scale: f64) -> Vec<Complex64> {
    cells.iter().map(|&(a, b, c)| grid[flat(side, a, b, c)] * scale).collect()
}

/// Signed grid displacement in `[-side/2, side/2)`, the wraparound
/// convention the circular convolution below indexes negative offsets with.
fn signed_offset(v: usize, side: usize) -> i64 {
    let v = v as i64;
    let side = side as i64;
    if v <= side / 2 {
        v
    } else {
        v - side
    }
}

/// Builds and forward-transforms `ue2dc` for one integer box separation: the
/// free-space kernel sampled at every grid displacement plus the physical
/// separation between the two box centers, so that
/// `IFFT(FFT(stamped density) .* ue2dc)` reproduces the direct kernel sum
/// between the source's equivalent surface and the target's check surface,
/// up to the grid's discretization and periodic wraparound.
fn interaction_tensor(kernel: &dyn Kernel, fft: &mut dyn Fft, side: usize, cell_size: f64, separation: Vector3) -> Vec<Complex64> {
    let mut offsets = Vec::with_capacity(side * side * side);
    for a in 0..side {
        let oa = signed_offset(a, side) as f64 * cell_size;
        for b in 0..side {
            let ob = signed_offset(b, side) as f64 * cell_size;
            for c in 0..side {
                let oc = signed_offset(c, side) as f64 * cell_size;
                offsets.push(separation.add(&Vector3::new(oa, ob, oc)));
            }
        }
    }
    let origin = [Vector3::zero()];
    let mut tensor = kernel.evaluate(&origin, &offsets);
    fft.forward(&mut tensor);
    tensor
}

/// Runs the V-list FFT sweep (§4.5) for every box at `level`: materializes
/// each referenced source's cached transform on first use, accumulates
/// every target's contribution in frequency space, inverse-transforms and
/// samples once per target, then records each consumption so `FftCache`
/// frees a source once its expected consumer count is reached. Returns the
/// per-target downward-check contribution, keyed by target box.
fn v_list_fft_sweep(
    hierarchy: &mut Hierarchy,
    level_boxes: &[BoxKey],
    level: u32,
    kernel: &dyn Kernel,
    fft: &mut dyn Fft,
    npq: usize,
) -> HashMap<BoxKey, Vec<Complex64>> {
    let side = fft.side();
    let npq_eff = npq.max(2);
    let cells = surface_cells(npq_eff, side);
    let half_width = hierarchy.box_half_width(&BoxKey::new(level, Index3::default()));
    let cell_size = (2.0 / (npq_eff as f64 - 1.0)) * 0.9 * half_width;
    let box_width_phys = 2.0 * half_width;

    // Stage 1: how many targets reference each source, so its cache frees
    // itself after exactly that many `record_use` calls.
    let mut consumers: HashMap<BoxKey, usize> = HashMap::new();
    for &key in level_boxes {
        if let Some(data) = hierarchy.boxes.get(&key) {
            for v in &data.lists.v {
                *consumers.entry(*v).or_insert(0) += 1;
            }
        }
    }

    // Stage 2: materialize each referenced source's transform.
    for (&src_key, &count) in &consumers {
        if count == 0 {
            continue;
        }
        let Some(density) = hierarchy.boxes.get(&src_key).map(|d| d.upward_equivalent_density.clone()) else {
            continue;
        };
        if density.is_empty() {
            continue;
        }
        let already_cached = hierarchy
            .boxes
            .get(&src_key)
            .map(|d| d.fft_cache.transform.is_some())
            .unwrap_or(false);
        if already_cached {
            continue;
        }
        let mut grid = stamp(&density, &cells, side);
        fft.forward(&mut grid);
        if let Some(data) = hierarchy.boxes.get_mut(&src_key) {
            data.fft_cache.transform = Some(grid);
            data.fft_cache.fftnum = count;
            data.fft_cache.fftcnt = 0;
        }
    }

    // Stage 3: accumulate every target's V-list sum in frequency space,
    // then inverse-transform and sample once per target.
    let mut tensor_cache: HashMap<Index3, Vec<Complex64>> = HashMap::new();
    let mut v_check_acc: HashMap<BoxKey, Vec<Complex64>> = HashMap::new();
    for &key in level_boxes {
        let vs = match hierarchy.boxes.get(&key) {
            Some(d) if !d.lists.v.is_empty() => d.lists.v.clone(),
            _ => continue,
        };
        let mut freq_acc = vec![Complex64::new(0.0, 0.0); side * side * side];
        let mut any = false;
        for v in &vs {
            let transform = match hierarchy.boxes.get(v).and_then(|s| s.fft_cache.transform.clone()) {
                Some(t) => t,
                None => continue,
            };
            let sep = key.index - v.index;
            let tensor = match tensor_cache.get(&sep) {
                Some(t) => t.clone(),
                None => {
                    let sep_world = Vector3::new(
                        sep.i as f64 * box_width_phys,
                        sep.j as f64 * box_width_phys,
                        sep.k as f64 * box_width_phys,
                    );
                    let built = interaction_tensor(kernel, fft, side, cell_size, sep_world);
                    tensor_cache.insert(sep, built.clone());
                    built
                }
            };
            for ((f, t), u) in freq_acc.iter_mut().zip(transform.iter()).zip(tensor.iter()) {
                *f += *t * *u;
            }
            any = true;
        }
        if any {
            fft.backward(&mut freq_acc);
            let scale = 1.0 / (side * side * side) as f64;
            v_check_acc.insert(key, sample(&freq_acc, &cells, side, scale));
        }
    }

    // Stage 4: record each consumption, freeing a source's cache once its
    // expected consumer count is reached.
    for &key in level_boxes {
        let vs = match hierarchy.boxes.get(&key) {
            Some(d) => d.lists.v.clone(),
            None => continue,
        };
        for v in vs {
            if let Some(src) = hierarchy.boxes.get_mut(&v) {
                if src.fft_cache.transform.is_some() {
                    src.fft_cache.record_use();
                }
            }
        }
    }

    debug_assert!(
        consumers.keys().all(|src_key| hierarchy
            .boxes
            .get(src_key)
            .map(|d| d.fft_cache.transform.is_none())
            .unwrap_or(true)),
        "V-list sweep left a source's FFT cache unreleased"
    );

    v_check_acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddfmm_traits::fft::NaiveDft;
    use ddfmm_traits::kernel::HelmholtzKernel;
    use ddfmm_tree::{BoxData, NearFieldLists};

    fn empty_hierarchy() -> Hierarchy {
        Hierarchy {
            boxes: HashMap::new(),
            domain_center: Vector3::zero(),
            domain_side: 4.0,
            maxlevel: 4,
            k: 1.0,
        }
    }

    #[test]
    fn v_list_sweep_frees_every_cache_after_its_expected_consumers() {
        let level = 2;
        let mut hierarchy = empty_hierarchy();
        let src_key = BoxKey::new(level, Index3::new(0, 0, 0));
        let tgt_a = BoxKey::new(level, Index3::new(2, 0, 0));
        let tgt_b = BoxKey::new(level, Index3::new(0, 2, 0));

        let src_data = BoxData {
            terminal: true,
            upward_equivalent_density: vec![Complex64::new(1.0, 0.0); 6 * 2 * 2],
            ..Default::default()
        };
        hierarchy.boxes.insert(src_key, src_data);

        for tgt in [tgt_a, tgt_b] {
            let data = BoxData {
                terminal: true,
                lists: NearFieldLists {
                    v: vec![src_key],
                    ..Default::default()
                },
                ..Default::default()
            };
            hierarchy.boxes.insert(tgt, data);
        }

        let level_boxes: Vec<BoxKey> = hierarchy.boxes.keys().copied().collect();
        let kernel = HelmholtzKernel { wavenumber: 1.0 };
        let mut fft = NaiveDft::new(4);
        let result = v_list_fft_sweep(&mut hierarchy, &level_boxes, level, &kernel, &mut fft, 2);

        assert_eq!(result.len(), 2);
        for contribution in result.values() {
            assert!(contribution.iter().any(|c| c.norm() > 0.0));
        }
        assert!(hierarchy.boxes[&src_key].fft_cache.transform.is_none());
        assert_eq!(hierarchy.boxes[&src_key].fft_cache.fftcnt, 0);
    }
}

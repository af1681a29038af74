use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Spatial geometry shared by convolution and transposed convolution.
///
/// Both ops relate a *narrow* map `[B, Cn, Hn, Wn]` and a *wide* map
/// `[B, Cw, Hw, Ww]` through a weight `[Cn, Cw, K, K]`, with taps
/// `wide = narrow * stride + k - padding`. A convolution computes the narrow
/// side from the wide one (input is wide); a transposed convolution computes
/// the wide side from the narrow one. Each op's backward pass is the other's
/// forward, plus a weight correlation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvGeometry {
    pub batch: usize,
    pub narrow_c: usize,
    pub wide_c: usize,
    pub narrow_hw: (usize, usize),
    pub wide_hw: (usize, usize),
    pub kernel: usize,
    pub stride: usize,
    pub padding: usize,
}

impl ConvGeometry {
    /// Output side of a convolution with a `[B, C, H, W]` input.
    pub fn conv_out(size: usize, kernel: usize, stride: usize, padding: usize) -> usize {
        assert!(
            size + 2 * padding >= kernel,
            "Kernel {kernel} larger than padded input {size}+2*{padding}"
        );
        (size + 2 * padding - kernel) / stride + 1
    }

    /// Output side of a transposed convolution.
    pub fn conv_transpose_out(size: usize, kernel: usize, stride: usize, padding: usize) -> usize {
        ((size - 1) * stride + kernel)
            .checked_sub(2 * padding)
            .unwrap_or_else(|| panic!("Padding {padding} too large for kernel {kernel}"))
    }

    fn narrow_len(&self) -> usize {
        self.batch * self.narrow_c * self.narrow_hw.0 * self.narrow_hw.1
    }

    fn wide_len(&self) -> usize {
        self.batch * self.wide_c * self.wide_hw.0 * self.wide_hw.1
    }

    fn weight_len(&self) -> usize {
        self.narrow_c * self.wide_c * self.kernel * self.kernel
    }

    /// Wide coordinate hit by narrow position `n` through kernel tap `k`.
    #[inline]
    fn tap(&self, n: usize, k: usize, wide_extent: usize) -> Option<usize> {
        (n * self.stride + k)
            .checked_sub(self.padding)
            .filter(|&w| w < wide_extent)
    }

    /// Call `f(narrow_idx, wide_idx, weight_idx)` for every valid tap.
    fn for_each_tap(&self, mut f: impl FnMut(usize, usize, usize)) {
        let (nh, nw) = self.narrow_hw;
        let (wh, ww) = self.wide_hw;
        let k = self.kernel;
        for b in 0..self.batch {
            for cn in 0..self.narrow_c {
                let n_base = (b * self.narrow_c + cn) * nh * nw;
                for cw in 0..self.wide_c {
                    let w_base = (b * self.wide_c + cw) * wh * ww;
                    let k_base = (cn * self.wide_c + cw) * k * k;
                    for kh in 0..k {
                        for y in 0..nh {
                            let Some(wy) = self.tap(y, kh, wh) else { continue };
                            for kw in 0..k {
                                let k_idx = k_base + kh * k + kw;
                                for x in 0..nw {
                                    let Some(wx) = self.tap(x, kw, ww) else { continue };
                                    f(n_base + y * nw + x, w_base + wy * ww + wx, k_idx);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// narrow[n] = Σ weight[k] · wide[w]
    pub fn gather(&self, weight: &[f32], wide: &[f32]) -> Vec<f32> {
        let mut narrow = vec![0.0; self.narrow_len()];
        self.for_each_tap(|n, w, k| narrow[n] += weight[k] * wide[w]);
        narrow
    }

    /// wide[w] = Σ weight[k] · narrow[n]
    pub fn scatter(&self, weight: &[f32], narrow: &[f32]) -> Vec<f32> {
        let mut wide = vec![0.0; self.wide_len()];
        self.for_each_tap(|n, w, k| wide[w] += weight[k] * narrow[n]);
        wide
    }

    /// dweight[k] = Σ narrow[n] · wide[w]
    pub fn correlate(&self, narrow: &[f32], wide: &[f32]) -> Vec<f32> {
        let mut dweight = vec![0.0; self.weight_len()];
        self.for_each_tap(|n, w, k| dweight[k] += narrow[n] * wide[w]);
        dweight
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConvKind {
    /// input is wide, output is narrow
    Forward,
    /// input is narrow, output is wide
    Transposed,
}

/// Gradient function for `conv2d` / `conv_transpose2d`. Parents are `[input, weight]`.
pub struct ConvGradFn {
    geometry: ConvGeometry,
    kind: ConvKind,
}

impl GradFn for ConvGradFn {
    fn backward(&self, out_grad: &[f32], parents: &[Tensor]) -> Vec<Option<Vec<f32>>> {
        let x = parents[0].borrow();
        let w = parents[1].borrow();
        let g = &self.geometry;

        let (dx, dw) = match self.kind {
            ConvKind::Forward => (
                x.requires_grad.then(|| g.scatter(&w.data, out_grad)),
                w.requires_grad.then(|| g.correlate(out_grad, &x.data)),
            ),
            ConvKind::Transposed => (
                x.requires_grad.then(|| g.gather(&w.data, out_grad)),
                w.requires_grad.then(|| g.correlate(&x.data, out_grad)),
            ),
        };
        vec![dx, dw]
    }
}

fn dims4(shape: &[usize], what: &str) -> (usize, usize, usize, usize) {
    assert_eq!(shape.len(), 4, "{what} must be 4D, got {shape:?}");
    (shape[0], shape[1], shape[2], shape[3])
}

impl RawTensor {
    /// 2D convolution without bias.
    ///
    /// `x`: `[B, Ci, H, W]`, `weight`: `[Co, Ci, K, K]` → `[B, Co, Ho, Wo]`
    /// with `Ho = (H + 2p - K) / s + 1`.
    pub fn conv2d(x: &Tensor, weight: &Tensor, stride: usize, padding: usize) -> Tensor {
        let (geometry, data) = {
            let xs = x.borrow();
            let ws = weight.borrow();
            let (batch, ci, h, w) = dims4(&xs.shape, "conv2d input");
            let (co, wci, kh, kw) = dims4(&ws.shape, "conv2d weight");
            assert_eq!(
                ci, wci,
                "Channel mismatch: input has {ci} channels but weight expects {wci}"
            );
            assert_eq!(kh, kw, "Only square kernels are supported");
            let geometry = ConvGeometry {
                batch,
                narrow_c: co,
                wide_c: ci,
                narrow_hw: (
                    ConvGeometry::conv_out(h, kh, stride, padding),
                    ConvGeometry::conv_out(w, kw, stride, padding),
                ),
                wide_hw: (h, w),
                kernel: kh,
                stride,
                padding,
            };
            let data = geometry.gather(&ws.data, &xs.data);
            (geometry, data)
        };
        let shape = [
            geometry.batch,
            geometry.narrow_c,
            geometry.narrow_hw.0,
            geometry.narrow_hw.1,
        ];
        Self::from_op(
            data,
            &shape,
            vec![x.clone(), weight.clone()],
            ConvGradFn {
                geometry,
                kind: ConvKind::Forward,
            },
        )
    }

    /// Transposed 2D convolution without bias (the adjoint of `conv2d`).
    ///
    /// `x`: `[B, Ci, H, W]`, `weight`: `[Ci, Co, K, K]` → `[B, Co, Ho, Wo]`
    /// with `Ho = (H - 1) * s + K - 2p`.
    pub fn conv_transpose2d(x: &Tensor, weight: &Tensor, stride: usize, padding: usize) -> Tensor {
        let (geometry, data) = {
            let xs = x.borrow();
            let ws = weight.borrow();
            let (batch, ci, h, w) = dims4(&xs.shape, "conv_transpose2d input");
            let (wci, co, kh, kw) = dims4(&ws.shape, "conv_transpose2d weight");
            assert_eq!(
                ci, wci,
                "Channel mismatch: input has {ci} channels but weight expects {wci}"
            );
            assert_eq!(kh, kw, "Only square kernels are supported");
            let geometry = ConvGeometry {
                batch,
                narrow_c: ci,
                wide_c: co,
                narrow_hw: (h, w),
                wide_hw: (
                    ConvGeometry::conv_transpose_out(h, kh, stride, padding),
                    ConvGeometry::conv_transpose_out(w, kw, stride, padding),
                ),
                kernel: kh,
                stride,
                padding,
            };
            let data = geometry.scatter(&ws.data, &xs.data);
            (geometry, data)
        };
        let shape = [
            geometry.batch,
            geometry.wide_c,
            geometry.wide_hw.0,
            geometry.wide_hw.1,
        ];
        Self::from_op(
            data,
            &shape,
            vec![x.clone(), weight.clone()],
            ConvGradFn {
                geometry,
                kind: ConvKind::Transposed,
            },
        )
    }
}

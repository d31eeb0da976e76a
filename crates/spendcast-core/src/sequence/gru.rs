//! Single-layer GRU with a linear output head
//!
//! Weights are stored as flat row-major vectors so the optimizer can treat
//! every tensor uniformly. The candidate state applies the reset gate to the
//! previous hidden state before the recurrent projection:
//!
//! ```text
//! z = sigmoid(Wz x + Uz h + bz)
//! r = sigmoid(Wr x + Ur h + br)
//! n = tanh(Wn x + Un (r * h) + bn)
//! h' = (1 - z) * n + z * h
//! y = Wo h_T + bo
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of weight tensors in [`GruParams`]
pub const TENSOR_COUNT: usize = 11;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GruParams {
    pub input_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub w_z: Vec<f64>,
    pub u_z: Vec<f64>,
    pub b_z: Vec<f64>,
    pub w_r: Vec<f64>,
    pub u_r: Vec<f64>,
    pub b_r: Vec<f64>,
    pub w_n: Vec<f64>,
    pub u_n: Vec<f64>,
    pub b_n: Vec<f64>,
    pub w_out: Vec<f64>,
    pub b_out: Vec<f64>,
}

/// Activations of one timestep, kept for backpropagation
#[derive(Debug, Clone)]
pub struct StepCache {
    x: Vec<f64>,
    h_prev: Vec<f64>,
    z: Vec<f64>,
    r: Vec<f64>,
    n: Vec<f64>,
}

/// Result of running a full sequence forward
#[derive(Debug, Clone)]
pub struct ForwardPass {
    steps: Vec<StepCache>,
    hidden: Vec<f64>,
    pub output: Vec<f64>,
}

impl GruParams {
    /// Xavier-uniform weights, zero gate biases, output bias at the middle of
    /// the scaled range
    pub fn init<R: Rng>(input_size: usize, hidden_size: usize, output_size: usize, rng: &mut R) -> Self {
        let mut xavier = |rows: usize, cols: usize| -> Vec<f64> {
            let limit = (6.0 / (rows + cols) as f64).sqrt();
            (0..rows * cols).map(|_| rng.gen_range(-limit..limit)).collect()
        };

        let w_z = xavier(hidden_size, input_size);
        let u_z = xavier(hidden_size, hidden_size);
        let w_r = xavier(hidden_size, input_size);
        let u_r = xavier(hidden_size, hidden_size);
        let w_n = xavier(hidden_size, input_size);
        let u_n = xavier(hidden_size, hidden_size);
        let w_out = xavier(output_size, hidden_size);

        Self {
            input_size,
            hidden_size,
            output_size,
            w_z,
            u_z,
            b_z: vec![0.0; hidden_size],
            w_r,
            u_r,
            b_r: vec![0.0; hidden_size],
            w_n,
            u_n,
            b_n: vec![0.0; hidden_size],
            w_out,
            b_out: vec![0.5; output_size],
        }
    }

    /// Same shapes, all zeros (gradient and optimizer moment buffers)
    pub fn zeros_like(&self) -> Self {
        let mut zeros = self.clone();
        for t in zeros.tensors_mut() {
            t.iter_mut().for_each(|v| *v = 0.0);
        }
        zeros
    }

    pub fn tensors(&self) -> [&Vec<f64>; TENSOR_COUNT] {
        [
            &self.w_z, &self.u_z, &self.b_z, &self.w_r, &self.u_r, &self.b_r, &self.w_n,
            &self.u_n, &self.b_n, &self.w_out, &self.b_out,
        ]
    }

    pub fn tensors_mut(&mut self) -> [&mut Vec<f64>; TENSOR_COUNT] {
        [
            &mut self.w_z,
            &mut self.u_z,
            &mut self.b_z,
            &mut self.w_r,
            &mut self.u_r,
            &mut self.b_r,
            &mut self.w_n,
            &mut self.u_n,
            &mut self.b_n,
            &mut self.w_out,
            &mut self.b_out,
        ]
    }

    /// Whether every tensor has the length its declared sizes imply
    pub fn shapes_valid(&self) -> bool {
        let (d, h, o) = (self.input_size, self.hidden_size, self.output_size);
        let expected = [h * d, h * h, h, h * d, h * h, h, h * d, h * h, h, o * h, o];
        self.tensors()
            .iter()
            .zip(expected)
            .all(|(t, len)| t.len() == len)
    }

    pub fn all_finite(&self) -> bool {
        self.tensors().iter().all(|t| t.iter().all(|v| v.is_finite()))
    }

    /// L2 norm over every tensor
    pub fn norm(&self) -> f64 {
        self.tensors()
            .iter()
            .flat_map(|t| t.iter())
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }

    pub fn scale(&mut self, factor: f64) {
        for t in self.tensors_mut() {
            t.iter_mut().for_each(|v| *v *= factor);
        }
    }

    /// Run a sequence of input vectors and produce the output vector
    pub fn forward(&self, inputs: &[Vec<f64>]) -> ForwardPass {
        let h_size = self.hidden_size;
        let d = self.input_size;
        let mut h = vec![0.0; h_size];
        let mut steps = Vec::with_capacity(inputs.len());

        for x in inputs {
            let mut z = self.b_z.clone();
            matvec_add(&mut z, &self.w_z, d, x);
            matvec_add(&mut z, &self.u_z, h_size, &h);
            z.iter_mut().for_each(|v| *v = sigmoid(*v));

            let mut r = self.b_r.clone();
            matvec_add(&mut r, &self.w_r, d, x);
            matvec_add(&mut r, &self.u_r, h_size, &h);
            r.iter_mut().for_each(|v| *v = sigmoid(*v));

            let rh: Vec<f64> = r.iter().zip(&h).map(|(r, h)| r * h).collect();
            let mut n = self.b_n.clone();
            matvec_add(&mut n, &self.w_n, d, x);
            matvec_add(&mut n, &self.u_n, h_size, &rh);
            n.iter_mut().for_each(|v| *v = v.tanh());

            let next: Vec<f64> = (0..h_size)
                .map(|i| (1.0 - z[i]) * n[i] + z[i] * h[i])
                .collect();

            steps.push(StepCache {
                x: x.clone(),
                h_prev: std::mem::replace(&mut h, next),
                z,
                r,
                n,
            });
        }

        let mut output = self.b_out.clone();
        matvec_add(&mut output, &self.w_out, h_size, &h);

        ForwardPass {
            steps,
            hidden: h,
            output,
        }
    }

    /// Backpropagate `d_output` (dLoss/dOutput) through time, accumulating
    /// into `grads`
    pub fn backward(&self, pass: &ForwardPass, d_output: &[f64], grads: &mut GruParams) {
        let h_size = self.hidden_size;
        let d = self.input_size;

        outer_add(&mut grads.w_out, h_size, d_output, &pass.hidden);
        add_assign(&mut grads.b_out, d_output);

        let mut dh = vec![0.0; h_size];
        matvec_t_add(&mut dh, &self.w_out, h_size, d_output);

        for step in pass.steps.iter().rev() {
            let mut dh_prev = vec![0.0; h_size];
            let mut da_z = vec![0.0; h_size];
            let mut da_r = vec![0.0; h_size];
            let mut da_n = vec![0.0; h_size];

            for i in 0..h_size {
                let dn = dh[i] * (1.0 - step.z[i]);
                let dz = dh[i] * (step.h_prev[i] - step.n[i]);
                dh_prev[i] = dh[i] * step.z[i];
                da_n[i] = dn * (1.0 - step.n[i] * step.n[i]);
                da_z[i] = dz * step.z[i] * (1.0 - step.z[i]);
            }

            let rh: Vec<f64> = step.r.iter().zip(&step.h_prev).map(|(r, h)| r * h).collect();
            outer_add(&mut grads.w_n, d, &da_n, &step.x);
            outer_add(&mut grads.u_n, h_size, &da_n, &rh);
            add_assign(&mut grads.b_n, &da_n);

            let mut d_rh = vec![0.0; h_size];
            matvec_t_add(&mut d_rh, &self.u_n, h_size, &da_n);
            for i in 0..h_size {
                dh_prev[i] += d_rh[i] * step.r[i];
                da_r[i] = d_rh[i] * step.h_prev[i] * step.r[i] * (1.0 - step.r[i]);
            }

            outer_add(&mut grads.w_z, d, &da_z, &step.x);
            outer_add(&mut grads.u_z, h_size, &da_z, &step.h_prev);
            add_assign(&mut grads.b_z, &da_z);
            outer_add(&mut grads.w_r, d, &da_r, &step.x);
            outer_add(&mut grads.u_r, h_size, &da_r, &step.h_prev);
            add_assign(&mut grads.b_r, &da_r);

            matvec_t_add(&mut dh_prev, &self.u_z, h_size, &da_z);
            matvec_t_add(&mut dh_prev, &self.u_r, h_size, &da_r);
            dh = dh_prev;
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// out += W x, with W row-major and `cols` columns
fn matvec_add(out: &mut [f64], w: &[f64], cols: usize, x: &[f64]) {
    for (i, o) in out.iter_mut().enumerate() {
        let row = &w[i * cols..(i + 1) * cols];
        *o += row.iter().zip(x).map(|(w, x)| w * x).sum::<f64>();
    }
}

/// out += W^T a, with W row-major and `cols` columns
fn matvec_t_add(out: &mut [f64], w: &[f64], cols: usize, a: &[f64]) {
    for (i, &ai) in a.iter().enumerate() {
        let row = &w[i * cols..(i + 1) * cols];
        for (o, w) in out.iter_mut().zip(row) {
            *o += w * ai;
        }
    }
}

/// grad += a b^T, with grad row-major and `cols` columns
fn outer_add(grad: &mut [f64], cols: usize, a: &[f64], b: &[f64]) {
    for (i, &ai) in a.iter().enumerate() {
        let row = &mut grad[i * cols..(i + 1) * cols];
        for (g, bj) in row.iter_mut().zip(b) {
            *g += ai * bj;
        }
    }
}

fn add_assign(out: &mut [f64], a: &[f64]) {
    for (o, a) in out.iter_mut().zip(a) {
        *o += a;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_params() -> GruParams {
        let mut rng = StdRng::seed_from_u64(3);
        GruParams::init(3, 4, 2, &mut rng)
    }

    fn inputs() -> Vec<Vec<f64>> {
        vec![
            vec![0.1, 0.7, 0.3],
            vec![0.9, 0.2, 0.5],
            vec![0.4, 0.4, 0.8],
            vec![0.0, 1.0, 0.6],
        ]
    }

    fn nudge(params: &mut GruParams, tensor: usize, k: usize, delta: f64) {
        let mut tensors = params.tensors_mut();
        tensors[tensor][k] += delta;
    }

    fn loss(params: &GruParams, inputs: &[Vec<f64>], target: &[f64]) -> f64 {
        let out = params.forward(inputs).output;
        0.5 * out.iter().zip(target).map(|(y, t)| (y - t) * (y - t)).sum::<f64>()
    }

    #[test]
    fn test_init_shapes() {
        let params = small_params();
        assert!(params.shapes_valid());
        assert!(params.all_finite());
        assert_eq!(params.b_out, vec![0.5, 0.5]);
        assert!(params.w_z.iter().all(|w| w.abs() <= (6.0f64 / 7.0).sqrt()));
    }

    #[test]
    fn test_init_is_deterministic() {
        assert_eq!(small_params(), small_params());
    }

    #[test]
    fn test_forward_output_size() {
        let pass = small_params().forward(&inputs());
        assert_eq!(pass.output.len(), 2);
        assert!(pass.output.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zeros_like() {
        let zeros = small_params().zeros_like();
        assert!(zeros.shapes_valid());
        assert_eq!(zeros.norm(), 0.0);
    }

    #[test]
    fn test_shapes_invalid_detected() {
        let mut params = small_params();
        params.u_n.pop();
        assert!(!params.shapes_valid());
    }

    #[test]
    fn test_backward_matches_numerical_gradient() {
        let params = small_params();
        let inputs = inputs();
        let target = vec![0.25, 0.75];

        let pass = params.forward(&inputs);
        let d_output: Vec<f64> = pass.output.iter().zip(&target).map(|(y, t)| y - t).collect();
        let mut grads = params.zeros_like();
        params.backward(&pass, &d_output, &mut grads);

        let eps = 1e-6;
        for tensor in 0..TENSOR_COUNT {
            let len = params.tensors()[tensor].len();
            for k in 0..len {
                let mut plus = params.clone();
                nudge(&mut plus, tensor, k, eps);
                let mut minus = params.clone();
                nudge(&mut minus, tensor, k, -eps);

                let numeric = (loss(&plus, &inputs, &target) - loss(&minus, &inputs, &target)) / (2.0 * eps);
                let analytic = grads.tensors()[tensor][k];
                assert!(
                    (numeric - analytic).abs() < 1e-6 + 1e-4 * analytic.abs(),
                    "tensor {} index {}: numeric {} analytic {}",
                    tensor,
                    k,
                    numeric,
                    analytic
                );
            }
        }
    }

    #[test]
    fn test_scale_and_norm() {
        let mut params = small_params();
        let before = params.norm();
        params.scale(0.5);
        assert!((params.norm() - before * 0.5).abs() < 1e-12);
    }
}

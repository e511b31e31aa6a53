use ndarray::Array2;

/// First and second moment estimates for one parameter tensor.
pub struct Adam {
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    timestep: usize,
    pub m: Array2<f32>,
    pub v: Array2<f32>,
}

impl Adam {
    pub fn new(shape: (usize, usize), beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            beta1,
            beta2,
            epsilon,
            timestep: 0,
            m: Array2::zeros(shape),
            v: Array2::zeros(shape),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.m.dim()
    }

    /// Grows the moments to `rows` rows; new rows start at zero.
    pub fn grow_rows(&mut self, rows: usize) {
        let (old_rows, cols) = self.m.dim();
        if rows <= old_rows {
            return;
        }
        let mut m = Array2::zeros((rows, cols));
        let mut v = Array2::zeros((rows, cols));
        m.slice_mut(ndarray::s![..old_rows, ..]).assign(&self.m);
        v.slice_mut(ndarray::s![..old_rows, ..]).assign(&self.v);
        self.m = m;
        self.v = v;
    }

    pub fn step(&mut self, params: &mut Array2<f32>, grads: &Array2<f32>, lr: f32) {
        self.timestep += 1;
        self.m = &self.m * self.beta1 + &(grads * (1.0 - self.beta1));
        self.v = &self.v * self.beta2 + &(grads.mapv(|x| x * x) * (1.0 - self.beta2));

        let m_hat = &self.m / (1.0 - self.beta1.powi(self.timestep as i32));
        let v_hat = &self.v / (1.0 - self.beta2.powi(self.timestep as i32));

        let update = m_hat / (v_hat.mapv(|x| x.sqrt()) + self.epsilon);

        *params -= &(update * lr);
    }
}

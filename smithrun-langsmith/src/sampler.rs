use uuid::Uuid;

pub trait Sampler: Send + Sync {
    fn should_sample(&self, trace_id: Uuid) -> bool;
}

const BUCKETS: u128 = 10_000;

/// Keeps roughly `rate` of traces; the decision is a pure function of the id.
#[derive(Clone, Debug)]
pub struct ProbabilitySampler {
    pub rate: f64,
}

impl Sampler for ProbabilitySampler {
    fn should_sample(&self, trace_id: Uuid) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        if self.rate <= 0.0 || self.rate.is_nan() {
            return false;
        }
        let bucket = (trace_id.as_u128() % BUCKETS) as f64 / BUCKETS as f64;
        bucket < self.rate
    }
}

/*
Reduction contract for group-wide sums.

When particles are split over several processes, every quantity that is a
sum over a thermostat group (kinetic energy tensors, Drude momenta) must be
reduced before a scale factor depending on it is computed. The engine only
relies on this contract; the transport belongs to the host.
*/

pub trait GroupReduction: Sync {
    /// Replace every element of `values` by its sum over all ranks.
    /// Returns only once the reduction is complete.
    fn sum(&self, values: &mut [f64]);

    fn is_distributed(&self) -> bool {
        false
    }
}

/// Single-process reduction: all particles are local, nothing to do
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalReduction;

impl GroupReduction for LocalReduction {
    fn sum(&self, _values: &mut [f64]) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::GroupReduction;

    /*
    Simulates a second rank holding a fixed contribution that is added on
    every reduction. Used to check that callers reduce before dividing.
     */
    pub struct OffsetReduction {
        pub offset: Vec<f64>,
        pub calls: Mutex<usize>,
    }

    impl OffsetReduction {
        pub fn new(offset: Vec<f64>) -> Self {
            Self {
                offset,
                calls: Mutex::new(0),
            }
        }
    }

    impl GroupReduction for OffsetReduction {
        fn sum(&self, values: &mut [f64]) {
            for (v, o) in values.iter_mut().zip(self.offset.iter()) {
                *v += o;
            }
            if let Ok(mut calls) = self.calls.lock() {
                *calls += 1;
            }
        }

        fn is_distributed(&self) -> bool {
            true
        }
    }
}

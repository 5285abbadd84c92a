/// Dissipation based damage per slip system.
///
/// Every system accumulates `|slip_rate * tau * dt| / W_cr`; the sum over all
/// systems is the aggregate damage which must stay below `D_cr`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageLaw {
    pub critical_dissipation: f64,
    pub critical_damage: f64,
}

/// Aggregate damage that crossed the critical value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalDamage {
    pub damage: f64,
    pub threshold: f64,
}

impl DamageLaw {
    pub fn new(critical_dissipation: f64, critical_damage: f64) -> Self {
        Self {
            critical_dissipation,
            critical_damage,
        }
    }

    pub fn increments(&self, slip_rate: &[f64], tau: &[f64], dt: f64, out: &mut [f64]) {
        for ((increment, rate), tau) in out.iter_mut().zip(slip_rate).zip(tau) {
            *increment = (rate * tau * dt).abs() / self.critical_dissipation;
        }
    }

    /// Writes `previous + increment` into `damage` and returns the aggregate.
    pub fn update(
        &self,
        previous: &[f64],
        increments: &[f64],
        damage: &mut [f64],
    ) -> Result<f64, CriticalDamage> {
        for ((d, previous), increment) in damage.iter_mut().zip(previous).zip(increments) {
            *d = previous + increment;
        }
        let aggregate: f64 = damage.iter().sum();
        if aggregate > self.critical_damage {
            Err(CriticalDamage {
                damage: aggregate,
                threshold: self.critical_damage,
            })
        } else {
            Ok(aggregate)
        }
    }
}

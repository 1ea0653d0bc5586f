#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Global tunables read by every cell update.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationParameters {
    /// Fraction of a node's output lost per tick when its input falls away.
    pub decay: f64,
    /// Hebbian rate for excitatory link weights.
    pub link_learn_rate: f64,
    /// Rate of threshold homeostasis on nodes.
    pub node_learn_rate: f64,
    /// Constant downward pull on node thresholds.
    pub node_forget_rate: f64,
    /// Window (in ticks) of the running-average filter.
    pub learn_time: f64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            decay: 0.1,
            link_learn_rate: 0.1,
            node_learn_rate: 0.01,
            node_forget_rate: 0.001,
            learn_time: 20.0,
        }
    }
}

impl SimulationParameters {
    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn with_link_learn_rate(mut self, rate: f64) -> Self {
        self.link_learn_rate = rate;
        self
    }

    pub fn with_node_learning(mut self, learn_rate: f64, forget_rate: f64) -> Self {
        self.node_learn_rate = learn_rate;
        self.node_forget_rate = forget_rate;
        self
    }

    pub fn with_learn_time(mut self, ticks: f64) -> Self {
        self.learn_time = ticks;
        self
    }

    /// Learn-time window as used by the running-average filter (never below 1).
    pub fn effective_learn_time(&self) -> f64 {
        self.learn_time.max(1.0)
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("decay", self.decay),
            ("link_learn_rate", self.link_learn_rate),
            ("node_learn_rate", self.node_learn_rate),
            ("node_forget_rate", self.node_forget_rate),
            ("learn_time", self.learn_time),
        ];
        for (name, v) in named {
            if !v.is_finite() {
                return Err(Error::InvalidParameter(format!("{name} must be finite")));
            }
            if v < 0.0 {
                return Err(Error::InvalidParameter(format!("{name} must be >= 0")));
            }
        }
        if self.decay > 1.0 {
            return Err(Error::InvalidParameter("decay must be <= 1".to_string()));
        }
        if self.learn_time < 1.0 {
            return Err(Error::InvalidParameter(
                "learn_time must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate parameters from JSON. Missing fields take defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(text: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(text)
            .map_err(|e| Error::InvalidParameter(format!("bad parameter file: {e}")))?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimulationParameters::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let p = SimulationParameters::default().with_decay(1.5);
        assert!(matches!(p.validate(), Err(Error::InvalidParameter(_))));

        let p = SimulationParameters::default().with_learn_time(0.5);
        assert!(p.validate().is_err());

        let p = SimulationParameters::default().with_link_learn_rate(f64::NAN);
        assert!(p.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let p = SimulationParameters::from_json(r#"{ "decay": 0.25, "learn_time": 50 }"#).unwrap();
        assert_eq!(p.decay, 0.25);
        assert_eq!(p.learn_time, 50.0);
        assert_eq!(
            p.link_learn_rate,
            SimulationParameters::default().link_learn_rate
        );

        assert!(SimulationParameters::from_json(r#"{ "decay": 3.0 }"#).is_err());
    }
}

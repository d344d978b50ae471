//! Radio propagation: received power and propagation delay.
//!
//! Contains:
//! - Two-ray ground reflection loss (Friis below the crossover distance)
//! - Plain Friis free-space loss
//! - Deterministic log-distance loss
//! - Constant-speed propagation delay
//!
//! Units:
//! - Power: dBm at the API, watts internally (conversion provided)
//! - Distance: meters
//! - Time: `SimDuration` (nanosecond resolution)
//!
//! Every model here is a pure function of its parameters and the two
//! positions, so repeated runs with the same scenario give identical results.

use serde::Deserialize;
use std::f64::consts::PI;

use super::geometry::{Vector3, distance};
use super::time::SimDuration;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

fn default_frequency() -> f64 {
    5.15e9
}

fn default_system_loss() -> f64 {
    1.0
}

fn default_min_distance() -> f64 {
    0.5
}

fn default_speed() -> f64 {
    SPEED_OF_LIGHT
}

/// Parameters of the two-ray ground reflection model.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TwoRayGroundParameters {
    /// Carrier frequency in Hz. Determines the wavelength λ = c / f.
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
    /// Dimensionless system loss L (≥ 1). 1.0 means no additional loss.
    #[serde(default = "default_system_loss")]
    pub system_loss: f64,
    /// Below this distance the received power equals the transmit power.
    #[serde(default = "default_min_distance")]
    pub min_distance_m: f64,
    /// Added to each node's z coordinate to obtain the antenna height.
    #[serde(default)]
    pub height_above_z_m: f64,
}

impl Default for TwoRayGroundParameters {
    fn default() -> Self {
        Self {
            frequency_hz: default_frequency(),
            system_loss: default_system_loss(),
            min_distance_m: default_min_distance(),
            height_above_z_m: 0.0,
        }
    }
}

/// Parameters of the Friis free-space model.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FriisParameters {
    #[serde(default = "default_frequency")]
    pub frequency_hz: f64,
    #[serde(default = "default_system_loss")]
    pub system_loss: f64,
}

impl Default for FriisParameters {
    fn default() -> Self {
        Self {
            frequency_hz: default_frequency(),
            system_loss: default_system_loss(),
        }
    }
}

/// Parameters of the log-distance path loss model.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogDistanceParameters {
    /// Path loss exponent (n).
    /// - n = 2.0: free space
    /// - n = 2.7 to 3.5: urban areas
    /// - n = 3.0 to 5.0: indoor obstructed environments
    pub path_loss_exponent: f64,
    /// Reference distance d₀ in meters.
    pub reference_distance_m: f64,
    /// Path loss at the reference distance in dB.
    pub reference_loss_db: f64,
}

/// Loss model selected by the scenario.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropagationLossModel {
    TwoRayGround(TwoRayGroundParameters),
    Friis(FriisParameters),
    LogDistance(LogDistanceParameters),
}

impl Default for PropagationLossModel {
    fn default() -> Self {
        PropagationLossModel::TwoRayGround(TwoRayGroundParameters::default())
    }
}

/// Delay model: signal travels at a constant speed along the straight line.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ConstantSpeedDelay {
    #[serde(default = "default_speed")]
    pub speed_m_per_s: f64,
}

impl Default for ConstantSpeedDelay {
    fn default() -> Self {
        Self {
            speed_m_per_s: SPEED_OF_LIGHT,
        }
    }
}

/// Loss model plus delay model, owned by a channel.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct PropagationModel {
    #[serde(default)]
    pub loss: PropagationLossModel,
    #[serde(default)]
    pub delay: ConstantSpeedDelay,
}

impl PropagationModel {
    /// Received power (dBm) at `receiver` for a transmission of `tx_power_dbm`
    /// from `sender`.
    pub fn received_power(&self, tx_power_dbm: f64, sender: &Vector3, receiver: &Vector3) -> f64 {
        match &self.loss {
            PropagationLossModel::TwoRayGround(params) => two_ray_ground_rx_power(tx_power_dbm, sender, receiver, params),
            PropagationLossModel::Friis(params) => {
                friis_rx_power(tx_power_dbm, distance(sender, receiver), wavelength(params.frequency_hz), params.system_loss)
            }
            PropagationLossModel::LogDistance(params) => tx_power_dbm - log_distance_path_loss(distance(sender, receiver), params),
        }
    }

    /// Time for a signal to travel from `sender` to `receiver`.
    pub fn delay(&self, sender: &Vector3, receiver: &Vector3) -> SimDuration {
        SimDuration::from_secs_f64(distance(sender, receiver) / self.delay.speed_m_per_s)
    }

    /// Validate model parameters, returning a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.delay.speed_m_per_s > 0.0) {
            return Err("propagation speed must be positive".to_string());
        }
        match &self.loss {
            PropagationLossModel::TwoRayGround(p) => {
                if !(p.frequency_hz > 0.0) {
                    return Err("two-ray ground frequency must be positive".to_string());
                }
                if p.system_loss < 1.0 {
                    return Err(format!("system loss {} must be >= 1", p.system_loss));
                }
                if p.min_distance_m < 0.0 {
                    return Err("minimum distance must be non-negative".to_string());
                }
            }
            PropagationLossModel::Friis(p) => {
                if !(p.frequency_hz > 0.0) {
                    return Err("Friis frequency must be positive".to_string());
                }
                if p.system_loss < 1.0 {
                    return Err(format!("system loss {} must be >= 1", p.system_loss));
                }
            }
            PropagationLossModel::LogDistance(p) => {
                if !(p.path_loss_exponent > 0.0) {
                    return Err("path loss exponent must be positive".to_string());
                }
                if !(p.reference_distance_m > 0.0) {
                    return Err("reference distance must be positive".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Wavelength in meters for a carrier frequency in Hz.
pub fn wavelength(frequency_hz: f64) -> f64 {
    SPEED_OF_LIGHT / frequency_hz
}

/// Convert power from dBm to watts.
///
/// ```text
/// P(W) = 10^((P(dBm) - 30) / 10)
/// ```
///
/// 30 dBm → 1 W, 0 dBm → 1 mW.
pub fn dbm_to_w(dbm: f64) -> f64 {
    10f64.powf((dbm - 30.0) / 10.0)
}

/// Convert power from watts to dBm. Inverse of `dbm_to_w`; zero watts maps to
/// negative infinity.
pub fn w_to_dbm(w: f64) -> f64 {
    10.0 * w.log10() + 30.0
}

/// Friis free-space received power.
///
/// # Formula
///
/// ```text
/// Pr = Pt × λ² / ((4π)² × d² × L)
/// ```
///
/// Below three wavelengths the far-field assumption does not hold and the
/// transmit power is returned unchanged.
pub fn friis_rx_power(tx_power_dbm: f64, distance_m: f64, lambda: f64, system_loss: f64) -> f64 {
    if distance_m < 3.0 * lambda {
        return tx_power_dbm;
    }
    let numerator = dbm_to_w(tx_power_dbm) * lambda * lambda;
    let denominator = 16.0 * PI * PI * distance_m * distance_m * system_loss;
    w_to_dbm(numerator / denominator)
}

/// Two-ray ground reflection received power.
///
/// # Formula
///
/// ```text
/// d_c = 4π × ht × hr / λ                       (crossover distance)
/// d ≤ d_min  : Pr = Pt
/// d ≤ d_c    : Pr = Pt × λ² / ((4π)² × d² × L)  (Friis)
/// d > d_c    : Pr = Pt × ht² × hr² / (d⁴ × L)
/// ```
///
/// Where `ht`/`hr` are the transmitter/receiver antenna heights (node z plus
/// `height_above_z_m`). Both branches agree at `d_c`. The result is capped at
/// `Pt`, which matters when `d_min` lies inside the near field (below
/// `λ/4π`); with the cap the received power never increases with distance.
/// If either antenna sits at zero height the ground-reflected ray is
/// undefined and the Friis branch is used throughout.
///
/// # Notes
///
/// With 16 dBm transmit power, 1 m antennas and 5.15 GHz, the crossover is
/// ~215.9 m and the received power at 251.1 m is ~−79.99 dBm, right at the
/// edge of a −80 dBm receiver.
pub fn two_ray_ground_rx_power(tx_power_dbm: f64, sender: &Vector3, receiver: &Vector3, params: &TwoRayGroundParameters) -> f64 {
    let d = distance(sender, receiver);
    if d <= params.min_distance_m {
        return tx_power_dbm;
    }

    let lambda = wavelength(params.frequency_hz);
    let ht = sender.z + params.height_above_z_m;
    let hr = receiver.z + params.height_above_z_m;
    let tx_w = dbm_to_w(tx_power_dbm);

    let crossover = 4.0 * PI * ht * hr / lambda;
    let rx_dbm = if ht <= 0.0 || hr <= 0.0 || d <= crossover {
        let denominator = 16.0 * PI * PI * d * d * params.system_loss;
        w_to_dbm(tx_w * lambda * lambda / denominator)
    } else {
        let denominator = d.powi(4) * params.system_loss;
        w_to_dbm(tx_w * ht * ht * hr * hr / denominator)
    };
    rx_dbm.min(tx_power_dbm)
}

/// Log-distance path loss in dB.
///
/// ```text
/// PL(d) = PL(d₀) + 10 × n × log₁₀(d / d₀)
/// ```
///
/// Distances at or below d₀ return PL(d₀).
pub fn log_distance_path_loss(distance_m: f64, params: &LogDistanceParameters) -> f64 {
    if distance_m <= params.reference_distance_m {
        return params.reference_loss_db;
    }
    params.reference_loss_db + 10.0 * params.path_loss_exponent * (distance_m / params.reference_distance_m).log10()
}

/// Estimate the largest distance at which a receiver with
/// `rx_sensitivity_dbm` still hears a transmitter, by bisection over the
/// model. Both antennas are placed at height `z`.
///
/// Relies on the received power being monotonic in distance.
pub fn estimate_range(model: &PropagationModel, tx_power_dbm: f64, rx_sensitivity_dbm: f64, z: f64) -> f64 {
    let origin = Vector3::new(0.0, 0.0, z);
    let power_at = |d: f64| model.received_power(tx_power_dbm, &origin, &Vector3::new(d, 0.0, z));

    if power_at(0.0) < rx_sensitivity_dbm {
        return 0.0;
    }
    let mut high = 1.0;
    while power_at(high) >= rx_sensitivity_dbm {
        high *= 2.0;
        if high > 1e9 {
            return high;
        }
    }
    let mut low = 0.0;
    for _ in 0..64 {
        let mid = (low + high) / 2.0;
        if power_at(mid) >= rx_sensitivity_dbm {
            low = mid;
        } else {
            high = mid;
        }
    }
    low
}

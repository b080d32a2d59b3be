//! Ground truth oracle for the vertexing simulation.
//!
//! The oracle produces toy V0 decays with known truth:
//! - Production point smeared around the beam spot
//! - Optional exponential decay length along the parent direction
//! - Isotropic two-body decay to e+e- boosted into the lab
//! - Perigee track parameters smeared with their own covariance
//!
//! All coordinates are in the tracking frame (beam along x, field along z).

use crate::error::SimError;
use nalgebra::{Matrix5, Vector3, Vector5};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Normal};
use vertexing_core::frames;
use vertexing_core::kinematics::{field_constant, ELECTRON_MASS};
use vertexing_core::linearize::predict_perigee;
use vertexing_core::{BilliorTrack, VertexerConfig};

/// Attempts at drawing a decay with both daughters above threshold.
const MAX_DECAY_ATTEMPTS: usize = 1000;

/// Curvature resolution used when tracks are straight (rho = 0).
const STRAIGHT_RHO_SIGMA: f64 = 1e-9;

/// A generated decay with its reconstructed-looking tracks.
#[derive(Debug, Clone)]
pub struct V0Event {
    /// Sequential event number
    pub id: u64,

    /// True decay vertex (tracking frame, mm)
    pub vertex: Vector3<f64>,

    /// True production point of the parent (tracking frame, mm)
    pub production: Vector3<f64>,

    /// True parent mass (GeV)
    pub mass: f64,

    /// True daughter momenta, positron first (tracking frame, GeV)
    pub momenta: [Vector3<f64>; 2],

    /// Smeared tracks, positron first
    pub tracks: Vec<BilliorTrack>,
}

impl V0Event {
    /// True decay vertex in detector coordinates.
    pub fn vertex_detector(&self) -> Vector3<f64> {
        frames::to_detector(&self.vertex)
    }

    /// Distance from production to decay (mm).
    pub fn decay_length(&self) -> f64 {
        (self.vertex - self.production).norm()
    }
}

/// Per-track resolutions: eps, z0 (mm), theta, phi0 (rad), relative rho.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackResolution {
    pub eps: f64,
    pub z0: f64,
    pub theta: f64,
    pub phi0: f64,
    pub rho_relative: f64,
}

impl Default for TrackResolution {
    fn default() -> Self {
        Self {
            eps: 0.05,
            z0: 0.05,
            theta: 1e-3,
            phi0: 1e-3,
            rho_relative: 0.02,
        }
    }
}

impl TrackResolution {
    fn sigmas(&self, rho: f64) -> Vector5<f64> {
        let rho_sigma = if rho == 0.0 {
            STRAIGHT_RHO_SIGMA
        } else {
            self.rho_relative * rho.abs()
        };
        Vector5::new(self.eps, self.z0, self.theta, self.phi0, rho_sigma)
    }
}

/// The oracle: owns the physics RNG and the decay model.
pub struct V0Oracle {
    /// Seed the RNG was created from
    physics_seed: u64,

    /// RNG for every random draw
    physics_rng: ChaCha8Rng,

    /// `B * FIELD_CONVERSION`; zero produces straight tracks
    field_constant: f64,

    /// Beam spot centre (tracking frame)
    beam_position: Vector3<f64>,

    /// Beam spot width per axis (tracking frame)
    beam_size: Vector3<f64>,

    /// Parent mass (GeV)
    parent_mass: f64,

    /// Parent momentum range (GeV)
    parent_momentum: (f64, f64),

    /// Angular spread of the parent around the beam axis (rad)
    angular_spread: f64,

    /// Mean decay length (mm); zero for prompt decays
    decay_length: f64,

    /// Minimum daughter momentum (GeV)
    min_daughter_momentum: f64,

    resolution: TrackResolution,

    next_id: u64,
}

impl V0Oracle {
    /// Creates an oracle with the field and beam spot of `config`.
    pub fn new(physics_seed: u64, config: &VertexerConfig) -> Self {
        Self {
            physics_seed,
            physics_rng: ChaCha8Rng::seed_from_u64(physics_seed),
            field_constant: field_constant(config.b_field),
            beam_position: Vector3::from(config.beam_position),
            beam_size: Vector3::from(config.beam_size),
            parent_mass: 0.08,
            parent_momentum: (1.2, 2.0),
            angular_spread: 0.005,
            decay_length: 0.0,
            min_daughter_momentum: 0.3,
            resolution: TrackResolution::default(),
            next_id: 0,
        }
    }

    pub fn with_parent_mass(mut self, mass: f64) -> Self {
        self.parent_mass = mass;
        self
    }

    pub fn with_parent_momentum(mut self, min: f64, max: f64) -> Self {
        self.parent_momentum = (min, max);
        self
    }

    /// Sets the mean decay length; zero gives prompt decays.
    pub fn with_decay_length(mut self, mean_mm: f64) -> Self {
        self.decay_length = mean_mm;
        self
    }

    pub fn with_resolution(mut self, resolution: TrackResolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Switches the field off so every track is a straight line.
    pub fn field_free(mut self) -> Self {
        self.field_constant = 0.0;
        self
    }

    pub fn seed(&self) -> u64 {
        self.physics_seed
    }

    pub fn is_field_free(&self) -> bool {
        self.field_constant == 0.0
    }

    /// Generates the next decay.
    pub fn generate(&mut self) -> Result<V0Event, SimError> {
        let id = self.next_id;
        self.next_id += 1;

        let beam_size = self.beam_size;
        let production = self.beam_position + self.gaussian(&beam_size)?;

        let slopes = self.gaussian(&Vector3::new(0.0, self.angular_spread, self.angular_spread))?;
        let direction = Vector3::new(1.0, slopes.y, slopes.z).normalize();

        let vertex = if self.decay_length > 0.0 {
            let exp = Exp::new(1.0 / self.decay_length)
                .map_err(|e| SimError::generation(format!("decay length: {}", e)))?;
            production + direction * exp.sample(&mut self.physics_rng)
        } else {
            production
        };

        let (low, high) = self.parent_momentum;
        let parent = direction * self.physics_rng.gen_range(low..high);
        let momenta = self.decay(&parent)?;

        let mut tracks = Vec::with_capacity(2);
        for (p, charge) in momenta.iter().zip([1.0, -1.0]) {
            let q = self.momentum_parameters(p, charge);
            tracks.push(self.smeared_track(&vertex, &q)?);
        }

        Ok(V0Event {
            id,
            vertex,
            production,
            mass: self.parent_mass,
            momenta,
            tracks,
        })
    }

    /// `(theta, phi, rho)` of a daughter with momentum `p` and charge sign.
    pub fn momentum_parameters(&self, p: &Vector3<f64>, charge: f64) -> Vector3<f64> {
        let pt = p.x.hypot(p.y);
        Vector3::new(pt.atan2(p.z), p.y.atan2(p.x), charge * self.field_constant / pt)
    }

    /// Two-body decay of a parent with lab momentum `parent`, isotropic in the rest frame.
    fn decay(&mut self, parent: &Vector3<f64>) -> Result<[Vector3<f64>; 2], SimError> {
        let m = self.parent_mass;
        let p_star2 = 0.25 * m * m - ELECTRON_MASS * ELECTRON_MASS;
        if p_star2 <= 0.0 {
            return Err(SimError::generation(format!("parent mass {} below threshold", m)));
        }
        let p_star = p_star2.sqrt();
        let e_star = 0.5 * m;

        let p_parent = parent.norm();
        let energy = (p_parent * p_parent + m * m).sqrt();
        let (beta, gamma) = (p_parent / energy, energy / m);
        let axis = parent / p_parent;

        for _ in 0..MAX_DECAY_ATTEMPTS {
            let cos_theta: f64 = self.physics_rng.gen_range(-1.0..1.0);
            let phi: f64 = self.physics_rng.gen_range(0.0..std::f64::consts::TAU);
            let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
            let rest = Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta) * p_star;

            let boost = |k: Vector3<f64>| {
                let parallel = k.dot(&axis);
                let perpendicular = k - axis * parallel;
                perpendicular + axis * (gamma * (parallel + beta * e_star))
            };
            let daughters = [boost(rest), boost(-rest)];

            if daughters.iter().all(|d| d.norm() > self.min_daughter_momentum) {
                return Ok(daughters);
            }
        }

        Err(SimError::generation(format!(
            "no decay above {} GeV after {} attempts",
            self.min_daughter_momentum, MAX_DECAY_ATTEMPTS
        )))
    }

    fn smeared_track(&mut self, vertex: &Vector3<f64>, q: &Vector3<f64>) -> Result<BilliorTrack, SimError> {
        let sigmas = self.resolution.sigmas(q[2]);
        let mut perigee = predict_perigee(vertex, q);
        // straight tracks keep rho exactly zero
        let smeared = if q[2] == 0.0 { 4 } else { 5 };
        for k in 0..smeared {
            let normal = Normal::new(0.0, sigmas[k])
                .map_err(|e| SimError::generation(format!("track smearing: {}", e)))?;
            perigee[k] += normal.sample(&mut self.physics_rng);
        }
        let covariance = Matrix5::from_diagonal(&sigmas.component_mul(&sigmas));
        Ok(BilliorTrack::new(perigee, covariance))
    }

    fn gaussian(&mut self, sigma: &Vector3<f64>) -> Result<Vector3<f64>, SimError> {
        let mut out = Vector3::zeros();
        for k in 0..3 {
            if sigma[k] > 0.0 {
                let normal = Normal::new(0.0, sigma[k])
                    .map_err(|e| SimError::generation(format!("gaussian: {}", e)))?;
                out[k] = normal.sample(&mut self.physics_rng);
            }
        }
        Ok(out)
    }
}

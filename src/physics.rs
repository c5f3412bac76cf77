use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::exact::ExactEngine;
use crate::process::PhysicsContext;

/// Exact physics operation, dispatched against a process's physics
/// context. Inputs are decimal strings so callers never handle
/// engine-owned values across the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhysicsCalculation {
    Gravity {
        mass: String,
    },
    Collision {
        position_a: String,
        position_b: String,
    },
    Trajectory {
        position: String,
        velocity: String,
    },
}

impl PhysicsCalculation {
    pub fn kind(&self) -> &'static str {
        match self {
            PhysicsCalculation::Gravity { .. } => "gravity",
            PhysicsCalculation::Collision { .. } => "collision",
            PhysicsCalculation::Trajectory { .. } => "trajectory",
        }
    }
}

/// Runs one calculation and renders the result as a decimal string. Every
/// intermediate value is released before returning, on success and on
/// parse failure alike.
pub fn calculate(
    ctx: &PhysicsContext,
    calc: &PhysicsCalculation,
    engine: &dyn ExactEngine,
) -> Result<String, CoreError> {
    match calc {
        PhysicsCalculation::Gravity { mass } => {
            let mass = engine.from_str(mass)?;
            let force = match engine.multiply(&mass, &ctx.gravity) {
                Ok(force) => force,
                Err(err) => {
                    engine.cleanup(mass);
                    return Err(err);
                }
            };
            let rendered = force.to_decimal_string();
            engine.cleanup(mass);
            engine.cleanup(force);
            Ok(rendered)
        }
        PhysicsCalculation::Collision {
            position_a,
            position_b,
        } => {
            let a = engine.from_str(position_a)?;
            let b = match engine.from_str(position_b) {
                Ok(b) => b,
                Err(err) => {
                    engine.cleanup(a);
                    return Err(err);
                }
            };
            // scratch delta is released on every path
            let distance = engine.subtract(&a, &b).and_then(|delta| {
                let distance = engine.abs(&delta);
                engine.cleanup(delta);
                distance
            });
            let distance = match distance {
                Ok(distance) => distance,
                Err(err) => {
                    engine.cleanup(a);
                    engine.cleanup(b);
                    return Err(err);
                }
            };
            let rendered = distance.to_decimal_string();
            engine.cleanup(a);
            engine.cleanup(b);
            engine.cleanup(distance);
            Ok(rendered)
        }
        PhysicsCalculation::Trajectory { position, velocity } => {
            let position = engine.from_str(position)?;
            let velocity = match engine.from_str(velocity) {
                Ok(v) => v,
                Err(err) => {
                    engine.cleanup(position);
                    return Err(err);
                }
            };
            let next = engine.multiply(&velocity, &ctx.time_delta).and_then(|displacement| {
                let next = engine.add(&position, &displacement);
                engine.cleanup(displacement);
                next
            });
            let next = match next {
                Ok(next) => next,
                Err(err) => {
                    engine.cleanup(position);
                    engine.cleanup(velocity);
                    return Err(err);
                }
            };
            let rendered = next.to_decimal_string();
            engine.cleanup(position);
            engine.cleanup(velocity);
            engine.cleanup(next);
            Ok(rendered)
        }
    }
}

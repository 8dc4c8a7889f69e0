pub mod implement;
pub mod inference_tier;
pub mod projectile;

pub use implement::ImplementDetector;
pub use inference_tier::InferenceTier;
pub use projectile::ProjectileDetector;

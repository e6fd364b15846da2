pub mod collision;
pub mod commit;
pub mod config;
pub mod crm;
pub mod drag;
pub mod format;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod services;
pub mod session;
pub mod telemetry;
pub mod window;

#[cfg(test)]
mod testing;

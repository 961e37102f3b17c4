// Domain layer: models, alerts and ports. Nothing in here talks to the outside world.

pub mod alert;
pub mod model;
pub mod ports;

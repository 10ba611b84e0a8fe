// Domain layer: pathnames, table model and ports (interfaces) to the outside world.

pub mod model;
pub mod pathname;
pub mod ports;

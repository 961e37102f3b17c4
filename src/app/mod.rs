// Application layer: tenant-facing command operations composed from the core services.

pub mod commands;

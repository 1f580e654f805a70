//! Multi-component batch tests

mod geometry_workflow;
mod instance_lifecycle;
mod uploads;

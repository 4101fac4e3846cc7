//! Filesystem helpers shared by the config, refresh marker and logout code

pub mod common;

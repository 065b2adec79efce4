//! skillvault - backup, restore and update manager for modular plugin trees
//!
//! This library provides the core functionality for skillvault. It keeps
//! timestamped archives of a managed application's plugin and workspace
//! directories, restores them onto a possibly different machine or user, and
//! updates the application and its git-managed modules with automatic
//! rollback.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `storage`: Atomic JSON and byte writes
//! - `tools`: Traits over git, gpg, rclone and the host, with CLI-backed
//!   implementations
//! - `backup`: Archive creation, catalog, path rehoming and restore
//! - `update`: Module updates and the full update run
//! - `lock`: Advisory lock shared by mutating commands
//! - `display`: Terminal formatting
//! - `cli`: Command handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use skillvault::config::{Settings, SkillvaultPaths};
//!
//! let paths = SkillvaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod lock;
pub mod logging;
pub mod storage;
pub mod tools;
pub mod update;

pub use error::{SkillvaultError, SkillvaultResult};

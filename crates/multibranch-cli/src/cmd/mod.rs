pub mod build;
pub mod event;
pub mod init;
pub mod list;
pub mod mangle;
pub mod prune;
pub mod scan;
pub mod show;
pub mod validate;
pub mod watch;

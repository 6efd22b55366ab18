mod args;

pub use args::{Cli, Commands, PreviewArgs, RunArgs};

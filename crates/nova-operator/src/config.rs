//! Command line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Command, FromArgMatches, Parser, Subcommand};

use nova_api_controller::config::TemplateRenderer;
use nova_api_controller::ReconcileConfig;
use nova_common::{Error, FIELD_MANAGER};

/// Nova operator - reconciles NovaAPI resources
#[derive(Parser, Debug)]
#[command(name = "nova-operator", version, about, long_about = None)]
pub struct Cli {
    /// Print the CRD manifests and exit
    #[arg(long)]
    pub crd: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the NovaAPI controller (default mode)
    Controller(ControllerArgs),
}

/// Settings of the controller loop
#[derive(Args, Clone, Debug, PartialEq)]
pub struct ControllerArgs {
    /// Only watch resources in this namespace
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Field manager for server-side apply
    #[arg(long, default_value = FIELD_MANAGER)]
    pub field_manager: String,

    /// Directory of `<document>.j2` templates overriding the embedded ones
    #[arg(long, env = "OPERATOR_TEMPLATES")]
    pub templates_dir: Option<PathBuf>,

    /// Resync interval once a NovaAPI is ready
    #[arg(long, default_value_t = 300)]
    pub resync_secs: u64,

    /// Poll interval while waiting on dependencies
    #[arg(long, default_value_t = 10)]
    pub waiting_requeue_secs: u64,

    /// Retry interval after a failed operation
    #[arg(long, default_value_t = 30)]
    pub error_requeue_secs: u64,
}

impl ControllerArgs {
    /// Arguments of a bare `controller` subcommand, environment applied
    pub fn from_env() -> Result<Self, clap::Error> {
        let matches = Self::augment_args(Command::new("controller"))
            .try_get_matches_from(["controller"])?;
        Self::from_arg_matches(&matches)
    }

    /// Requeue intervals for the reconciler
    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            resync: Duration::from_secs(self.resync_secs),
            waiting_requeue: Duration::from_secs(self.waiting_requeue_secs),
            error_requeue: Duration::from_secs(self.error_requeue_secs),
        }
    }

    /// Config renderer, with overrides from `templates_dir` if set
    pub fn renderer(&self) -> Result<TemplateRenderer, Error> {
        match &self.templates_dir {
            Some(dir) => TemplateRenderer::from_dir(dir),
            None => TemplateRenderer::embedded(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller_args(argv: &[&str]) -> ControllerArgs {
        let cli = Cli::try_parse_from(argv).expect("arguments should parse");
        match cli.command {
            Some(Commands::Controller(args)) => args,
            None => panic!("expected controller subcommand"),
        }
    }

    #[test]
    fn defaults_match_reconcile_defaults() {
        let args = controller_args(&["nova-operator", "controller"]);
        assert_eq!(args.field_manager, FIELD_MANAGER);
        assert_eq!(args.reconcile_config(), ReconcileConfig::default());
    }

    #[test]
    fn intervals_and_namespace_from_flags() {
        let args = controller_args(&[
            "nova-operator",
            "controller",
            "--namespace",
            "openstack",
            "--resync-secs",
            "60",
            "--error-requeue-secs",
            "5",
        ]);
        assert_eq!(args.namespace.as_deref(), Some("openstack"));
        let config = args.reconcile_config();
        assert_eq!(config.resync, Duration::from_secs(60));
        assert_eq!(config.error_requeue, Duration::from_secs(5));
        assert_eq!(config.waiting_requeue, Duration::from_secs(10));
    }

    #[test]
    fn crd_flag_needs_no_subcommand() {
        let cli = Cli::try_parse_from(["nova-operator", "--crd"]).unwrap();
        assert!(cli.crd);
        assert!(cli.command.is_none());
    }

    #[test]
    fn bare_invocation_builds_default_args() {
        let args = ControllerArgs::from_env().unwrap();
        assert_eq!(args.resync_secs, 300);
        assert_eq!(args.field_manager, FIELD_MANAGER);
    }

    #[test]
    fn nonexistent_templates_dir_keeps_embedded_templates() {
        let args = ControllerArgs {
            templates_dir: Some(std::env::temp_dir().join("nova-operator-no-such-dir")),
            ..ControllerArgs::from_env().unwrap()
        };
        assert!(args.renderer().is_ok());
    }
}

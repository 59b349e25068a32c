use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rxmesh")]
#[command(author, version, about = "Pharmacy multi-agent orchestrator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Route a free-text message through the orchestrator
    Route {
        message: String,

        /// Acting user, enables per-user checks such as interaction warnings
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Dispatch a request with an explicit intent, skipping the model
    Intent {
        intent: String,

        /// Extra payload fields as a JSON object
        #[arg(short, long)]
        payload: Option<String>,

        #[arg(short, long)]
        user: Option<String>,
    },

    /// Run a workflow definition from a JSON file
    Workflow {
        file: String,

        #[arg(short, long)]
        user: Option<String>,
    },

    /// Run the built-in checkout workflow (compliance check, then order creation)
    Checkout {
        /// Initial context as a JSON object, e.g. {"cart_items": [...]}
        #[arg(short, long)]
        payload: Option<String>,

        #[arg(short, long)]
        user: Option<String>,
    },

    /// List registered agents and their tools
    Agents,
}

use clap::{Parser, Subcommand};

/// chainlite - route chat queries through chains of RAG, code and LLM agents
#[derive(Parser, Debug)]
#[command(name = "chainlite")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Data directory (registry, documents, index, sessions)
    #[arg(long, global = true, env = "CHAINLITE_DATA_DIR")]
    pub data_dir: Option<String>,

    /// API base URL
    #[arg(long, global = true, env = "CHAINLITE_API_BASE")]
    pub api_base: Option<String>,

    /// API key
    #[arg(long, global = true, env = "CHAINLITE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model name
    #[arg(long, global = true, env = "CHAINLITE_MODEL")]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a project a question (chain mode if a chain resolves, else fallback)
    Chat {
        /// Project id
        #[arg(value_name = "PROJECT")]
        project: String,

        /// The query
        #[arg(value_name = "QUERY")]
        query: String,

        /// Requester identity; keys the chat session
        #[arg(long, default_value = "cli")]
        requester: String,

        /// Act as admin (any project, any chain)
        #[arg(long, default_value = "false")]
        admin: bool,

        /// Per-request chain as comma-separated agent ids
        #[arg(long, value_delimiter = ',', conflicts_with = "chain_json")]
        chain: Vec<String>,

        /// Per-request chain as a JSON array of steps ({"agent_id", "context", "files"})
        #[arg(long, value_name = "JSON")]
        chain_json: Option<String>,

        /// Print the response as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run one agent directly against a query (no history)
    RunAgent {
        /// Agent id
        #[arg(value_name = "AGENT")]
        agent: String,

        /// Project id (scopes retrieval)
        #[arg(value_name = "PROJECT")]
        project: String,

        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Show recorded turns and the last chain for a requester
    History {
        #[arg(value_name = "PROJECT")]
        project: String,

        #[arg(long, default_value = "cli")]
        requester: String,

        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Store and index a document for a project (.txt, .md, .pdf)
    Ingest {
        #[arg(value_name = "PROJECT")]
        project: String,

        #[arg(value_name = "FILE")]
        file: String,

        /// Name to store the document under (default: the file name)
        #[arg(long)]
        name: Option<String>,

        /// Uploader identity
        #[arg(long, default_value = "cli")]
        requester: String,

        /// Upload as admin; otherwise the project must allow user chaining
        #[arg(long, default_value = "false")]
        admin: bool,
    },

    /// Manage registered agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Manage projects and their default chains
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// List built-in units and their implementations
    Catalog,
}

#[derive(Subcommand, Debug)]
pub enum AgentAction {
    /// Register an agent descriptor
    Register {
        /// Display name (`<Name>Agent` is the implementation looked up)
        #[arg(value_name = "NAME")]
        name: String,

        /// Type tag: `rag` (or any `*document*` tag) for retrieval, anything else for code
        #[arg(long = "type", default_value = "code")]
        agent_type: String,

        #[arg(long)]
        description: Option<String>,

        /// Catalog unit (e.g. builtin:utilities) or script path
        #[arg(long)]
        location: Option<String>,

        /// Configuration as a JSON object
        #[arg(long, value_name = "JSON")]
        config: Option<String>,
    },

    /// List registered agents
    List,

    /// Replace an agent's configuration
    SetConfig {
        #[arg(value_name = "AGENT")]
        agent: String,

        #[arg(value_name = "JSON")]
        config: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectAction {
    /// Create a project
    Create {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Registered agent ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,

        /// Let non-admin requesters run their own chains
        #[arg(long, default_value = "false")]
        allow_user_chaining: bool,
    },

    /// Add registered agents to a project
    AddAgents {
        #[arg(value_name = "PROJECT")]
        project: String,

        #[arg(value_name = "AGENT", required = true)]
        agents: Vec<String>,
    },

    /// Set the project default chain (agent ids in execution order)
    SetChain {
        #[arg(value_name = "PROJECT")]
        project: String,

        #[arg(value_name = "AGENT", conflicts_with = "json")]
        agents: Vec<String>,

        /// Steps as a JSON array instead of bare ids
        #[arg(long, value_name = "JSON")]
        json: Option<String>,
    },

    /// Show one project as JSON
    Show {
        #[arg(value_name = "PROJECT")]
        project: String,
    },

    /// List projects
    List,
}

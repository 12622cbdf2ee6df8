use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:3000/tasks";

#[derive(Debug, Parser)]
#[command(name = "upcoming", about = "Upcoming tasks, with email sign-in links")]
pub struct Config {
    /// Project URL of the hosted backend, e.g. https://xyz.supabase.co
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: String,

    /// Public anon key of the project
    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub anon_key: String,

    /// Where the emailed sign-in link sends the user.
    /// Must be in the project's list of allowed redirect URLs.
    #[arg(long, env = "UPCOMING_REDIRECT_URL", default_value = DEFAULT_REDIRECT_URL)]
    pub redirect_url: String,

    /// Address a sign-in link landed on. Starts on the task list and
    /// establishes the session from the token it carries.
    #[arg(long, env = "UPCOMING_CALLBACK_URL")]
    pub callback_url: Option<String>,

    /// Append logs to this file. The terminal belongs to the UI,
    /// so nothing is logged without it.
    #[arg(long, env = "UPCOMING_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

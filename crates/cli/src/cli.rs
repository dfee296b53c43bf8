use clap::{Parser, Subcommand};

/// Incident commander: ask operational questions in plain language.
///
/// Questions are mapped onto a fixed catalog of analytical operations,
/// run against the event store, and summarized into an incident report.
#[derive(Parser, Debug)]
#[command(name = "commander", about = "Incident commander for operational event data")]
pub struct CliArgs {
    /// Config profile (keys resolve as {PROFILE}_{KEY} before {KEY})
    #[arg(long, env = "COMMANDER_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a single question and exit
    Ask {
        /// The question, e.g. "any error spikes in the last 30 minutes?"
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Print the full report as JSON instead of formatted text
        #[arg(long)]
        json: bool,

        /// Deliver the report to the configured notification channels
        #[arg(long)]
        notify: bool,
    },

    /// Interactive session: one report per line of input
    Repl {
        /// Deliver every report to the configured notification channels
        #[arg(long)]
        notify: bool,
    },

    /// List the analytical operations and their parameters
    Operations,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_joins_words_and_flags() {
        let args =
            CliArgs::try_parse_from(["commander", "ask", "errors", "in", "payments?", "--json"])
                .unwrap();
        match args.command {
            Command::Ask { text, json, notify } => {
                assert_eq!(text.join(" "), "errors in payments?");
                assert!(json);
                assert!(!notify);
            }
            other => panic!("expected ask, got {other:?}"),
        }
    }

    #[test]
    fn ask_requires_text() {
        assert!(CliArgs::try_parse_from(["commander", "ask"]).is_err());
    }

    #[test]
    fn profile_and_subcommands() {
        let args =
            CliArgs::try_parse_from(["commander", "--profile", "prod", "operations"]).unwrap();
        assert_eq!(args.profile.as_deref(), Some("prod"));
        assert!(matches!(args.command, Command::Operations));

        let repl = CliArgs::try_parse_from(["commander", "repl", "--notify"]).unwrap();
        assert!(matches!(repl.command, Command::Repl { notify: true }));
    }
}

//! Chatflow CLI
//!
//! Operator access to the budget, attendance and leave workflows.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatflow::gateway::MattermostClient;
use chatflow::store::SqliteStore;
use chatflow::workflow::{LeaveInput, NewBudgetRequest, PaymentInput};
use chatflow::{
    AttendanceService, BudgetEngine, BudgetRequest, Clock, Config, LeaveKind, LeaveService,
    Outcome, SystemClock,
};

#[derive(Parser)]
#[command(name = "chatflow")]
#[command(author, version, about = "Guarded approval workflows over chat")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default .chatflow/config.toml
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Config,

    /// Budget approval workflow
    Budget {
        #[command(subcommand)]
        action: BudgetCommands,
    },

    /// Daily attendance
    Attendance {
        #[command(subcommand)]
        action: AttendanceCommands,
    },

    /// Leave requests
    Leave {
        #[command(subcommand)]
        action: LeaveCommands,
    },
}

#[derive(Subcommand)]
enum BudgetCommands {
    /// Step 1: create a request from a sale channel
    Create {
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
        /// Origin (sale) channel id
        #[arg(long)]
        channel: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        partner: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        purpose: String,
        /// YYYY-MM-DD
        #[arg(long)]
        deadline: String,
    },

    /// Step 2: partner submits post content
    Content {
        id: String,
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "")]
        post_link: String,
        #[arg(long, default_value = "")]
        page_link: String,
    },

    /// Step 3: reviewer confirms the content
    Confirm {
        id: String,
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
    },

    /// Send the content back to the partner
    Return {
        id: String,
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
        #[arg(long)]
        reason: String,
    },

    /// Step 4: partner submits payment details
    Payment {
        id: String,
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        bank: String,
        #[arg(long)]
        amount: String,
    },

    /// Step 5: approve the payment
    Approve {
        id: String,
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
    },

    /// Step 6: finance completes the transfer
    Complete {
        id: String,
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
        #[arg(long)]
        transaction: String,
        #[arg(long, default_value = "")]
        bill: String,
    },

    /// Reject at any step before completion
    Reject {
        id: String,
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
    },

    /// Print a request as YAML
    Show { id: String },
}

#[derive(Subcommand)]
enum AttendanceCommands {
    CheckIn {
        #[arg(long, env = "CHATFLOW_USER")]
        user: String,
        #[arg(long)]
        username: String,
        /// Attendance channel id
        #[arg(long)]
        channel: String,
        /// Uploaded photo file id
        #[arg(long)]
        image: Option<String>,
    },

    BreakStart {
        #[arg(long, env = "CHATFLOW_USER")]
        user: String,
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        reason: String,
    },

    BreakEnd {
        #[arg(long, env = "CHATFLOW_USER")]
        user: String,
        #[arg(long)]
        username: String,
    },

    CheckOut {
        #[arg(long, env = "CHATFLOW_USER")]
        user: String,
        #[arg(long)]
        username: String,
    },

    /// Day report, or one user's records with --user
    Report {
        /// Day to report (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum LeaveCommands {
    /// File a leave request
    Request {
        #[arg(long, env = "CHATFLOW_USER")]
        user: String,
        /// Display name (looked up when omitted)
        #[arg(long)]
        username: Option<String>,
        /// Attendance channel id
        #[arg(long)]
        channel: String,
        /// annual, emergency, sick, late or early
        #[arg(long)]
        kind: LeaveKind,
        /// YYYY-MM-DD, repeatable
        #[arg(long = "date", required = true)]
        dates: Vec<String>,
        /// HH:MM for late arrival / early departure
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        reason: String,
    },

    Approve {
        id: String,
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
        #[arg(long, default_value = "")]
        actor_name: String,
    },

    Reject {
        id: String,
        #[arg(long, env = "CHATFLOW_USER")]
        actor: String,
        #[arg(long, default_value = "")]
        actor_name: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
}

/// Engines wired to SQLite and Mattermost
struct App {
    budget: BudgetEngine,
    attendance: AttendanceService,
    leave: LeaveService,
}

impl App {
    async fn connect(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(
            SqliteStore::connect(&config.store.database)
                .await
                .context("opening document store")?,
        );
        let client = Arc::new(MattermostClient::new(
            &config.gateway.base_url,
            &config.gateway.bot_token,
        ));
        let offset = config.offset()?;

        Ok(Self {
            budget: BudgetEngine::new(
                store.clone(),
                client.clone(),
                client.clone(),
                config.budget.clone(),
                &config.gateway.callback_url,
            ),
            attendance: AttendanceService::new(
                store.clone(),
                store.clone(),
                client.clone(),
                client.clone(),
                offset,
            ),
            leave: LeaveService::new(
                store,
                client.clone(),
                client,
                config.attendance.clone(),
                offset,
                &config.gateway.callback_url,
            ),
        })
    }
}

/// Print the result line and any best-effort failures
fn report<T>(outcome: &Outcome<T>, message: String) {
    println!("{}", message);
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
}

fn budget_line(req: &BudgetRequest) -> String {
    let state = if req.is_rejected() {
        "rejected".to_string()
    } else {
        req.current_step.to_string()
    };
    format!("{}  step {}", req.id, state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Init { force } => {
            let path = chatflow::config::init(&std::env::current_dir()?, force)?;
            info!("Wrote {}", path.display());
        }

        Commands::Config => {
            let config = Config::load(cli.config.as_deref())?;
            println!("{}", config.to_toml()?);
        }

        Commands::Budget { action } => {
            let config = Config::load(cli.config.as_deref())?;
            let app = App::connect(&config).await?;
            handle_budget(action, &app.budget).await?;
        }

        Commands::Attendance { action } => {
            let config = Config::load(cli.config.as_deref())?;
            let app = App::connect(&config).await?;
            handle_attendance(action, &app.attendance, &config).await?;
        }

        Commands::Leave { action } => {
            let config = Config::load(cli.config.as_deref())?;
            let app = App::connect(&config).await?;
            handle_leave(action, &app.leave).await?;
        }
    }

    Ok(())
}

async fn handle_budget(action: BudgetCommands, engine: &BudgetEngine) -> anyhow::Result<()> {
    let outcome = match action {
        BudgetCommands::Create {
            actor,
            channel,
            name,
            partner,
            amount,
            purpose,
            deadline,
        } => {
            let input = NewBudgetRequest {
                origin_channel: channel,
                name,
                partner,
                amount,
                purpose,
                deadline,
            };
            engine.create_request(&actor, input).await?
        }
        BudgetCommands::Content {
            id,
            actor,
            text,
            post_link,
            page_link,
        } => {
            engine
                .submit_content(&id, &actor, &text, &post_link, &page_link)
                .await?
        }
        BudgetCommands::Confirm { id, actor } => engine.confirm_review(&id, &actor).await?,
        BudgetCommands::Return { id, actor, reason } => {
            engine.return_for_rework(&id, &actor, &reason).await?
        }
        BudgetCommands::Payment {
            id,
            actor,
            recipient,
            account,
            bank,
            amount,
        } => {
            let input = PaymentInput {
                recipient,
                account,
                bank,
                amount,
            };
            engine.submit_payment(&id, &actor, input).await?
        }
        BudgetCommands::Approve { id, actor } => engine.approve(&id, &actor).await?,
        BudgetCommands::Complete {
            id,
            actor,
            transaction,
            bill,
        } => engine.complete(&id, &actor, &transaction, &bill).await?,
        BudgetCommands::Reject { id, actor } => engine.reject(&id, &actor).await?,
        BudgetCommands::Show { id } => {
            let req = engine.get(&id).await?;
            print!("{}", serde_yaml::to_string(&req)?);
            return Ok(());
        }
    };

    let line = budget_line(&outcome.value);
    report(&outcome, line);
    Ok(())
}

async fn handle_attendance(
    action: AttendanceCommands,
    service: &AttendanceService,
    config: &Config,
) -> anyhow::Result<()> {
    let outcome = match action {
        AttendanceCommands::CheckIn {
            user,
            username,
            channel,
            image,
        } => {
            service
                .check_in(&user, &username, &channel, image.as_deref())
                .await?
        }
        AttendanceCommands::BreakStart {
            user,
            username,
            reason,
        } => service.break_start(&user, &username, &reason).await?,
        AttendanceCommands::BreakEnd { user, username } => {
            service.break_end(&user, &username).await?
        }
        AttendanceCommands::CheckOut { user, username } => {
            service.check_out(&user, &username).await?
        }
        AttendanceCommands::Report {
            date,
            user,
            from,
            to,
        } => {
            let today = SystemClock.today(config.offset()?);
            let date = date.unwrap_or(today);
            match user {
                Some(user) => {
                    let lines = service
                        .user_report(&user, from.unwrap_or(date), to.unwrap_or(date))
                        .await?;
                    for line in lines {
                        println!("{}", line);
                    }
                }
                None => print!("{}", service.day_report(date).await?),
            }
            return Ok(());
        }
    };

    let record = &outcome.value;
    let line = format!("@{} is {}", record.username, record.status());
    report(&outcome, line);
    Ok(())
}

async fn handle_leave(action: LeaveCommands, service: &LeaveService) -> anyhow::Result<()> {
    let outcome = match action {
        LeaveCommands::Request {
            user,
            username,
            channel,
            kind,
            dates,
            time,
            reason,
        } => {
            let input = LeaveInput {
                kind,
                dates,
                expected_time: time,
                reason,
            };
            service
                .request(&user, username.as_deref(), &channel, input)
                .await?
        }
        LeaveCommands::Approve {
            id,
            actor,
            actor_name,
        } => service.approve(&id, &actor, &actor_name).await?,
        LeaveCommands::Reject {
            id,
            actor,
            actor_name,
            reason,
        } => service.reject(&id, &actor, &actor_name, &reason).await?,
    };

    let req = &outcome.value;
    let line = format!("{}  {}", req.id, req.status);
    report(&outcome, line);
    Ok(())
}

//! Command-line driver for the sweeps engine.
//!
//! Plays rounds, runs ticket lifecycles and tails realtime channels against a
//! backend described by a YAML config.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use sweeps_client::{
    celebration::WinCelebration,
    chat::ChatLog,
    config::Config,
    pull_tab::PullTabTicket,
    scratch::{ScratchCanvas, ScratchCard},
    sync::{dispatch, Effect},
    ChannelEvent, ChannelManager, Client, RoundFlow, Scope, Session, TicketFlow,
};
use sweeps_types::{
    Currency, DiceDirection, GameRoundOutcome, GameRoundRequest, RoundResult, TicketKind,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Play and watch sweeps games from the terminal")]
struct Args {
    /// Path to the YAML client config
    #[arg(short, long, default_value = "sweeps.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Spin a slot machine
    Spin {
        #[arg(long, default_value_t = 1)]
        game_id: u64,
        #[arg(long)]
        bet: f64,
        #[arg(long, value_enum, default_value_t = CurrencyArg::Gc)]
        currency: CurrencyArg,
    },
    /// Roll the dice
    Roll {
        #[arg(long, default_value_t = 2)]
        game_id: u64,
        #[arg(long)]
        bet: f64,
        #[arg(long, value_enum, default_value_t = CurrencyArg::Gc)]
        currency: CurrencyArg,
        #[arg(long, default_value_t = 50.0)]
        target: f64,
        #[arg(long, value_enum, default_value_t = DirectionArg::Over)]
        direction: DirectionArg,
    },
    /// List ticket products
    Tickets,
    /// Buy a ticket, reveal it and settle a win
    Ticket {
        #[arg(long)]
        ticket_type: u64,
        /// Save a win for later instead of claiming it
        #[arg(long)]
        save: bool,
    },
    /// Post to a game room
    Chat {
        #[arg(long)]
        game: String,
        message: String,
    },
    /// Tail balance and community chat pushes until interrupted
    Watch,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CurrencyArg {
    Gc,
    Sc,
}

impl From<CurrencyArg> for Currency {
    fn from(arg: CurrencyArg) -> Self {
        match arg {
            CurrencyArg::Gc => Currency::Gc,
            CurrencyArg::Sc => Currency::Sc,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DirectionArg {
    Over,
    Under,
}

impl From<DirectionArg> for DiceDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Over => DiceDirection::Over,
            DirectionArg::Under => DiceDirection::Under,
        }
    }
}

/// Foil size used when scratching from the terminal.
const CANVAS: (u32, u32) = (60, 40);

/// Brush radius for the scratch sweep.
const BRUSH: f64 = 6.0;

fn describe(outcome: &GameRoundOutcome) -> String {
    match outcome.result() {
        RoundResult::Reels(reels) => reels
            .iter()
            .map(|&r| sweeps_types::slot_symbol(r))
            .collect::<Vec<_>>()
            .join(" "),
        RoundResult::Roll(roll) => format!("rolled {roll:.1}"),
        RoundResult::Ticket(symbols) => symbols
            .iter()
            .map(|&s| sweeps_types::slot_symbol(s))
            .collect::<Vec<_>>()
            .join(" "),
        RoundResult::Empty => String::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Load config
    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read {}", args.config.display()))?;
    let config = Config::from_yaml(&raw)
        .context("failed to parse config")?
        .validate()
        .context("invalid config")?;

    // Setup logging
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let client = config.client().context("failed to build client")?;
    let session = Session::new();
    let profile = session
        .refresh(&client)
        .await
        .context("failed to load profile")?;
    info!(user = profile.id, username = %profile.username, "logged in");

    match args.command {
        Command::Spin {
            game_id,
            bet,
            currency,
        } => {
            let request = GameRoundRequest::slots(game_id, bet, currency.into());
            play(&client, &session, &config.eligible_currencies, request).await?;
        }
        Command::Roll {
            game_id,
            bet,
            currency,
            target,
            direction,
        } => {
            let request =
                GameRoundRequest::dice(game_id, bet, currency.into(), target, direction.into());
            play(&client, &session, &config.eligible_currencies, request).await?;
        }
        Command::Tickets => {
            for ticket in client.ticket_types().await? {
                println!(
                    "{:>4}  {:<16} {} {}",
                    ticket.id,
                    ticket.name,
                    ticket.price,
                    ticket.currency.code()
                );
            }
        }
        Command::Ticket { ticket_type, save } => {
            let ticket = client
                .ticket_types()
                .await?
                .into_iter()
                .find(|t| t.id == ticket_type)
                .with_context(|| format!("no ticket type {ticket_type}"))?;
            let kind = ticket.kind;
            let flow = TicketFlow::new(&client, &session, ticket);
            let purchase_id = flow.purchase().await?;
            info!(purchase_id, "ticket purchased");
            match kind {
                TicketKind::Scratch => {
                    let canvas = ScratchCanvas::new(CANVAS.0, CANVAS.1);
                    let mut card =
                        ScratchCard::with_threshold(flow, canvas, config.scratch_threshold);
                    let outcome = card
                        .scratch_off(BRUSH)
                        .await?
                        .context("foil cleared without reaching the reveal threshold")?;
                    println!("{}", describe(&outcome));
                    settle(card.flow(), save).await?;
                }
                TicketKind::PullTab => {
                    let mut ticket = PullTabTicket::new(flow);
                    let outcome = ticket
                        .pull_all()
                        .await?
                        .context("no tab revealed the ticket")?;
                    println!("{}", describe(&outcome));
                    settle(ticket.flow(), save).await?;
                }
            }
            let balance = session.balance()?;
            println!("balance: {} GC / {} SC", balance.gc_balance, balance.sc_balance);
        }
        Command::Chat { game, message } => {
            client.post_game_chat(&game, &message).await?;
        }
        Command::Watch => watch(&client, &session, config.channel_options).await?,
    }

    Ok(())
}

async fn settle(flow: &TicketFlow<'_, Client>, save: bool) -> anyhow::Result<()> {
    let Some(celebration) = WinCelebration::for_ticket(flow) else {
        return Ok(());
    };
    println!("{}  {}", celebration.headline(), celebration.amount_label());
    if save {
        flow.save().await?;
    } else {
        flow.claim().await?;
    }
    Ok(())
}

async fn play(
    client: &Client,
    session: &Session,
    eligible: &[Currency],
    request: GameRoundRequest,
) -> anyhow::Result<()> {
    let flow = RoundFlow::new(client, session, eligible.to_vec());
    let outcome = flow.play(request.clone()).await?;
    println!("{}", describe(&outcome));
    match WinCelebration::for_round(&outcome, &request, session.referral_code()) {
        Some(celebration) => {
            println!("{}  {}", celebration.headline(), celebration.amount_label())
        }
        None => println!("no win"),
    }
    let balance = session.balance()?;
    println!("balance: {} GC / {} SC", balance.gc_balance, balance.sc_balance);
    Ok(())
}

async fn watch(
    client: &Client,
    session: &Session,
    options: sweeps_client::ChannelOptions,
) -> anyhow::Result<()> {
    let user = session.user_id().context("no session")?;
    let mut manager = ChannelManager::new(client, options)?;
    let mut balances = manager.join(Scope::User(user)).await;
    let mut community = manager.join(Scope::GlobalChat).await;
    let mut chat = ChatLog::default();
    chat.load_global(client.global_chat_history().await?);
    for message in chat.global() {
        println!("[{}] {}", message.username, message.message);
    }

    loop {
        let event = tokio::select! {
            event = balances.next() => event,
            event = community.next() => event,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(event) = event else {
            warn!("channel closed");
            break;
        };
        let ChannelEvent::Event(event) = event else {
            info!(?event, "channel state");
            continue;
        };
        match dispatch(event, session, &mut chat) {
            Effect::Balance(balance) => {
                println!("balance: {} GC / {} SC", balance.gc_balance, balance.sc_balance)
            }
            Effect::GlobalMessage(message) | Effect::RoomMessage(message) => {
                println!("[{}] {}", message.username, message.message)
            }
            Effect::Moderation(error) => println!("moderated: {error}"),
            Effect::Ignored => {}
        }
    }

    manager.close_all().await;
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use cortan::bootstrap::Cortan;
use cortan::events::{
    EMERGENCY_EVENT_TYPE, EmergencyOutcome, Event, EventContext, LoggingHandler, Priority,
    RequestKind, ResponseStyle, SUGGESTION_EVENT_TYPE, WelcomeKind, select_response_style,
};
use cortan::observability::init_tracing;
use cortan::profile::{UserProfile, read_profile, write_profile};

#[derive(Parser)]
#[command(name = "cortan", about = "Cortan event bus playground", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wire up a few handlers and run a short scripted session.
    Demo {
        /// User the session belongs to.
        #[arg(long, default_value = "demo-user")]
        user: String,

        /// Good interactions to record before the proactive suggestion.
        #[arg(long, default_value_t = 3)]
        interactions: u32,
    },

    /// Print the response style for a priority and context.
    Style {
        /// critical, high, normal, low, or background.
        #[arg(long, default_value = "normal")]
        priority: Priority,

        /// Emotional state, e.g. neutral, playful, urgent.
        #[arg(long, default_value = "neutral")]
        emotion: String,

        /// Urgency in [0, 1].
        #[arg(long, default_value_t = 0.5)]
        urgency: f64,

        /// Greeting style preference: casual, formal, technical.
        #[arg(long)]
        greeting: Option<String>,

        /// Interactions of quality 1.0 already recorded for the user.
        /// Without this (and without --greeting) no profile is attached.
        #[arg(long)]
        interactions: Option<u32>,

        /// Print the decision as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Publish an emergency and report whether handlers finished in time.
    Emergency {
        /// Emergency description.
        message: String,

        /// Mission the emergency relates to.
        #[arg(long, default_value = "unassigned")]
        mission: String,

        /// Override the wait bound in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Simulated handler latency in milliseconds.
        #[arg(long, default_value_t = 0)]
        handler_delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cortan = Cortan::from_env()?;
    init_tracing(&cortan.config.logging);

    match cli.command {
        Commands::Demo { user, interactions } => run_demo(cortan, &user, interactions).await,
        Commands::Style {
            priority,
            emotion,
            urgency,
            greeting,
            interactions,
            json,
        } => {
            let mut context = EventContext::default()
                .with_emotional_state(emotion)
                .with_urgency(urgency);
            if greeting.is_some() || interactions.is_some() {
                let mut profile = UserProfile::new("cli-user");
                if let Some(greeting) = greeting {
                    profile.preferences.greeting_style = greeting;
                }
                for _ in 0..interactions.unwrap_or(0) {
                    profile.record_interaction(1.0);
                }
                context = EventContext::for_user(profile.into_shared())
                    .with_emotional_state(context.emotional_state)
                    .with_urgency(context.urgency_level);
            }

            let style = select_response_style(priority, &context);
            if json {
                let decision = serde_json::json!({
                    "style": style,
                    "priority": priority,
                    "familiarity": context.familiarity(),
                    "greeting_style": context.greeting_style(),
                });
                println!("{}", serde_json::to_string_pretty(&decision)?);
            } else {
                println!(
                    "{style}  (priority={priority}, familiarity={:.2}, greeting={})",
                    context.familiarity(),
                    context.greeting_style()
                );
            }
            Ok(())
        }
        Commands::Emergency {
            message,
            mission,
            timeout_ms,
            handler_delay_ms,
        } => {
            if let Some(ms) = timeout_ms {
                cortan.config.bus.emergency_timeout = Duration::from_millis(ms.max(1));
                cortan = Cortan::new(cortan.config);
            }
            let bus = cortan.bus;
            bus.subscribe_urgent(Arc::new(LoggingHandler::new("pager")))
                .await;
            let delay = Duration::from_millis(handler_delay_ms);
            bus.subscribe_fn(
                EMERGENCY_EVENT_TYPE,
                "responder",
                move |event: Arc<Event>| async move {
                    tokio::time::sleep(delay).await;
                    tracing::info!(correlation_id = event.correlation_id(), "Responder done");
                    Ok(())
                },
            )
            .await;

            match bus.publish_emergency(&message, &mission).await {
                EmergencyOutcome::Completed {
                    correlation_id,
                    report,
                } => println!(
                    "{correlation_id}: {} of {} handlers succeeded",
                    report.succeeded, report.dispatched
                ),
                EmergencyOutcome::TimedOut {
                    correlation_id,
                    waited,
                } => println!(
                    "{correlation_id}: still running after {} ms",
                    waited.as_millis()
                ),
            }
            Ok(())
        }
    }
}

async fn run_demo(cortan: Cortan, user_id: &str, interactions: u32) -> anyhow::Result<()> {
    let Cortan { bus, directory, .. } = cortan;

    for event_type in ["cortana.welcome", "user.request", SUGGESTION_EVENT_TYPE] {
        bus.subscribe(event_type, Arc::new(LoggingHandler::new("log")))
            .await;
    }
    bus.subscribe_urgent(Arc::new(LoggingHandler::new("pager")))
        .await;
    bus.subscribe_with_context_fn(
        SUGGESTION_EVENT_TYPE,
        "stylist",
        |event: Arc<Event>, context: Arc<EventContext>| async move {
            let style = ResponseStyle::for_event(&event);
            println!(
                "[{style}] suggestion for {}: {}",
                context.user_id(),
                context.suggestion().unwrap_or_default()
            );
            Ok(())
        },
    )
    .await;

    let session_id = Uuid::new_v4().to_string();
    let context = directory
        .context_for(user_id)
        .await
        .with_session(session_id.clone())
        .with_location("workshop");
    bus.set_user_context(user_id, context.clone()).await;

    let welcome = bus.factory().welcome(
        WelcomeKind::UserLogin,
        format!("Welcome back, {user_id}."),
        user_id,
        context.clone(),
    );
    bus.emit(welcome).await.wait().await;

    for i in 0..interactions {
        let request = bus.factory().user_request(
            format!("request #{}", i + 1),
            RequestKind::Question,
            context.clone(),
        );
        bus.emit(request).await.wait().await;
        directory.update_familiarity(user_id, 1.0).await;
    }

    if let Some(profile) = directory.get(user_id).await {
        write_profile(&profile).add_interest("robotics");
        let profile = read_profile(&profile);
        println!(
            "{}: familiarity {:.2}, {} after {} interactions",
            profile.user_id,
            profile.familiarity_level(),
            profile.relationship_status(),
            profile.interaction_count()
        );
    }

    bus.publish_proactive("run tests", context.clone(), None)
        .await
        .wait()
        .await;

    let outcome = bus
        .publish_emergency("Reactor temperature above threshold", "mission-demo")
        .await;
    println!(
        "emergency {} {}",
        outcome.correlation_id(),
        if outcome.timed_out() { "timed out" } else { "handled" }
    );

    let stats = bus.stats().await;
    println!(
        "published={} dispatched={} failures={} active_users={}",
        stats.events_published,
        stats.handlers_dispatched,
        stats.handler_failures,
        directory.list_active_default().await.len()
    );
    let mut by_type: Vec<_> = stats.events_by_type.into_iter().collect();
    by_type.sort();
    for (event_type, count) in by_type {
        println!("  {event_type:<20} {count}");
    }
    Ok(())
}

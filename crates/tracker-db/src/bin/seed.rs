//! # Seed Data Generator
//!
//! Populates a database with demo users, topics, reports and posts for
//! development.
//!
//! ## Usage
//! ```bash
//! # 20 reports per topic (default)
//! cargo run -p tracker-db --bin seed
//!
//! # Custom amount
//! cargo run -p tracker-db --bin seed -- --count 200
//!
//! # Specify database path
//! cargo run -p tracker-db --bin seed -- --db ./data/tracker.db
//! ```
//!
//! ## Generated Data
//! - One account per name in `USERS`, the first one an administrator
//! - One topic per entry in `TOPICS`, moderated by a developer
//! - `count` reports per topic with rotating kind, severity and status
//! - Two posts per report, and a notification to the topic moderator

use std::env;

use serde_json::json;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracker_core::{
    NewNotification, NewPost, NewReport, NewTopic, NewUser, NotificationKind, ReportKind,
    ReportSeverity, ReportStatus, TopicCategory, UserCriteria, UserRole,
};
use tracker_db::{Database, DbConfig, DbResult, Transaction};

/// Demo accounts: (username, display name, role)
const USERS: &[(&str, &str, UserRole)] = &[
    ("admin", "Site Admin", UserRole::Administrator),
    ("ada", "Ada Lovelace", UserRole::Developer),
    ("grace", "Grace Hopper", UserRole::Developer),
    ("linus", "Linus T.", UserRole::User),
    ("margaret", "Margaret Hamilton", UserRole::User),
    ("dennis", "Dennis R.", UserRole::User),
];

/// Demo topics: (title, description, category)
const TOPICS: &[(&str, &str, TopicCategory)] = &[
    ("Desktop Client", "The desktop application", TopicCategory::Application),
    ("Mobile App", "Android and iOS clients", TopicCategory::Application),
    ("Forum", "Community discussion board", TopicCategory::Community),
    ("Build Server", "CI hardware and runners", TopicCategory::Hardware),
    ("Sync Service", "Cloud synchronisation backend", TopicCategory::Service),
];

/// Report title fragments, combined with a running number
const SUBJECTS: &[&str] = &[
    "Crash when saving",
    "Login page is slow",
    "Typo in settings dialog",
    "Add dark mode",
    "Memory grows over time",
    "Cannot upload attachment",
    "Wrong time zone in emails",
    "Export to CSV",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 20;
    let mut db_path = String::from("./tracker_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bug Tracker Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Reports per topic (default: 20)");
                println!("  -d, --db <PATH>    Database file path (default: ./tracker_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Bug Tracker Seed Data Generator");
    println!("==================================");
    println!("Database: {}", db_path);
    println!("Reports per topic: {}", count);
    println!();

    let db = Database::open(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let mut tx = db.begin().await?;
    let existing = tx.users().count(&UserCriteria::default()).await?;
    tx.rollback().await?;
    if existing > 0 {
        println!("⚠ Database already has {} users", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();

    let user_ids = db
        .transaction(|tx| Box::pin(async move { create_users(tx).await }))
        .await?;
    println!("✓ Created {} users", user_ids.len());

    let mut reports = 0;
    for (topic_idx, topic) in TOPICS.iter().enumerate() {
        let users = user_ids.clone();
        reports += db
            .transaction(|tx| Box::pin(async move { seed_topic(tx, topic, topic_idx, &users, count).await }))
            .await?;
        println!("  Seeded topic '{}'", topic.0);
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} topics and {} reports in {:?}", TOPICS.len(), reports, elapsed);

    let stats = db.stats();
    println!("  Pool: {} open, {} idle, max {}", stats.size, stats.idle, stats.max);

    db.close().await;
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tracker_db=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .init();
}

async fn create_users(tx: &mut Transaction) -> DbResult<Vec<String>> {
    let mut ids = Vec::with_capacity(USERS.len());
    for (username, display_name, role) in USERS {
        let id = tx
            .users()
            .create(&NewUser {
                username: username.to_string(),
                email: format!("{username}@tracker.example"),
                display_name: display_name.to_string(),
                role: *role,
            })
            .await?;
        ids.push(id);
    }
    Ok(ids)
}

/// Creates one topic with its reports; returns the number of reports.
async fn seed_topic(
    tx: &mut Transaction,
    (title, description, category): &(&str, &str, TopicCategory),
    topic_idx: usize,
    users: &[String],
    count: usize,
) -> DbResult<usize> {
    let creator = &users[0];
    // Developers (index 1 and 2) take turns moderating
    let moderator = &users[1 + topic_idx % 2];

    let topic_id = tx
        .topics()
        .create(&NewTopic {
            title: title.to_string(),
            description: description.to_string(),
            category: *category,
            creator_id: Some(creator.clone()),
        })
        .await?;
    tx.topics().add_moderator(&topic_id, moderator).await?;

    for n in 0..count {
        let seed = topic_idx * 1000 + n;
        let author = &users[3 + seed % (users.len() - 3)];

        let report_id = tx
            .reports()
            .create(&NewReport {
                topic_id: topic_id.clone(),
                author_id: Some(author.clone()),
                title: format!("{} #{}", SUBJECTS[seed % SUBJECTS.len()], n + 1),
                kind: ReportKind::ALL[seed % ReportKind::ALL.len()],
                severity: ReportSeverity::ALL[(seed / 3) % ReportSeverity::ALL.len()],
            })
            .await?;

        for (post_idx, poster) in [author, moderator].into_iter().enumerate() {
            tx.posts()
                .create(&NewPost {
                    report_id: report_id.clone(),
                    author_id: Some(poster.clone()),
                    content: if post_idx == 0 {
                        "Steps to reproduce are in the title.".to_string()
                    } else {
                        "Thanks, we are looking into it.".to_string()
                    },
                })
                .await?;
        }

        // Every fourth report moves on from `open`
        if n % 4 == 3 {
            let status = [ReportStatus::Analyzed, ReportStatus::Processing, ReportStatus::Closed][seed % 3];
            tx.reports().change_status(&report_id, status, 1).await?;
        }

        tx.notifications()
            .create(&NewNotification {
                recipient_id: moderator.clone(),
                actor_id: Some(author.clone()),
                kind: NotificationKind::ReportCreated,
                report_id: Some(report_id),
                topic_id: Some(topic_id.clone()),
                payload: json!({ "topic": title, "number": n + 1 }),
            })
            .await?;
    }

    Ok(count)
}

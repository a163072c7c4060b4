/// Bootstrap an administrator account.
/// Staff accounts can only be created through the API by an existing admin,
/// so the first one comes from here.
///
/// Usage: create-admin --name "Jane Admin" --email admin@example.com [--password ...]
///   The password falls back to the ADMIN_PASSWORD environment variable.

use anyhow::Context;
use clap::Parser;

use funeral_home_api::{
    db,
    models::user::UserRole,
    services::auth::{validate_account_fields, AuthService},
};

#[derive(Parser)]
#[command(name = "create-admin", about = "Create an administrator account")]
struct Args {
    #[arg(long)]
    name: String,

    #[arg(long)]
    email: String,

    /// Falls back to ADMIN_PASSWORD
    #[arg(long, env = "ADMIN_PASSWORD")]
    password: String,

    #[arg(long)]
    phone: Option<String>,

    /// Create a morgue attendant instead of an admin
    #[arg(long)]
    attendant: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let errors = validate_account_fields(&args.name, &args.email, &args.password);
    if let Some(first) = errors.first() {
        anyhow::bail!("{}: {}", first.field, first.message);
    }

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = db::create_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let role = if args.attendant { UserRole::MorgueAttendant } else { UserRole::Admin };
    let user = AuthService::insert_user(
        &pool,
        &args.name,
        &args.email,
        &args.password,
        role,
        args.phone.as_deref(),
        None,
    )
    .await
    .map_err(|e| anyhow::anyhow!("could not create account: {e}"))?;

    tracing::info!(user_id = %user.id, email = %user.email, role = %user.role, "account created");
    pool.close().await;
    Ok(())
}

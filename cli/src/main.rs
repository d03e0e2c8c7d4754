// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # CardVault CLI
//!
//! Entry point for the `cardvault` binary. Parses CLI arguments, initializes
//! logging, builds a vault session and runs one lifecycle operation.
//!
//! - `keygen`, `validate`, `version` work offline.
//! - `tokenize`, `retrieve`, `revoke`, `decrypt`, `status`, `mode` talk to
//!   the ledger at `--rpc-url`.
//!
//! Command output goes to stdout, logs to stderr.

mod cli;
mod logging;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use cardvault_engine::card::{detect_network, mask_card_number, validate_card_number, CardData};
use cardvault_engine::config::{VaultConfig, ENGINE_VERSION};
use cardvault_engine::crypto::{Address, VaultKeypair};
use cardvault_engine::vault::{AccessMode, RevokeOutcome, VaultSession};

use cli::{CardvaultCli, Commands, GlobalArgs, IdentityArgs, ModeCommand};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CardvaultCli::parse();
    logging::init_logging("cardvault=info,cardvault_engine=info", cli.global.log_format);

    match cli.command {
        Commands::Keygen => keygen(),
        Commands::Validate { pan } => validate(&pan),
        Commands::Tokenize(args) => tokenize(&cli.global, args).await,
        Commands::Retrieve(args) => retrieve(&cli.global, &args.secret).await,
        Commands::Revoke(args) => revoke(&cli.global, &args.secret).await,
        Commands::Decrypt(args) => decrypt(&cli.global, args).await,
        Commands::Status(args) => status(&cli.global, &args).await,
        Commands::Mode { command } => match command {
            ModeCommand::Get(args) => mode_get(&cli.global, &args).await,
            ModeCommand::Set { mode, secret } => mode_set(&cli.global, &mode, &secret.secret).await,
        },
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Session construction
// ---------------------------------------------------------------------------

fn vault_config(global: &GlobalArgs) -> Result<VaultConfig> {
    let vault_contract = global
        .vault_contract
        .clone()
        .context("a vault contract is required: pass --vault-contract or set CARDVAULT_VAULT_CONTRACT")?;

    let mut config = VaultConfig::for_vault(vault_contract);
    config.rpc_url = global.rpc_url.clone();
    config.access_contract_id = global.access_contract.clone();
    if let Some(ms) = global.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms));
    }
    Ok(config)
}

fn secret_session(global: &GlobalArgs, secret: &str) -> Result<VaultSession> {
    VaultSession::builder(vault_config(global)?)
        .secret_hex(secret)
        .context("invalid secret: expected 64 hex characters")?
        .build()
        .context("failed to build vault session")
}

/// A session for public reads: the address wins if both are given.
fn identity_session(global: &GlobalArgs, args: &IdentityArgs) -> Result<VaultSession> {
    match (&args.address, &args.secret) {
        (Some(address), _) => {
            let address: Address = address
                .parse()
                .with_context(|| format!("invalid address {address}"))?;
            VaultSession::builder(vault_config(global)?)
                .public_identity(address)
                .build()
                .context("failed to build vault session")
        }
        (None, Some(secret)) => secret_session(global, secret),
        (None, None) => bail!("pass --address or --secret (or set CARDVAULT_SECRET)"),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to encode output")?
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Offline commands
// ---------------------------------------------------------------------------

fn keygen() -> Result<()> {
    let keypair = VaultKeypair::generate();
    tracing::info!(address = %keypair.address(), "keypair generated");

    println!("Address     : {}", keypair.address());
    println!("Public key  : {}", keypair.public_key().to_hex());
    println!("Secret      : {}", keypair.secret_key_hex().as_str());
    eprintln!("Keep the secret offline. Anyone holding it can decrypt your stored cards.");
    Ok(())
}

fn validate(pan: &str) -> Result<()> {
    let valid = validate_card_number(pan);
    println!("Card     : {}", mask_card_number(pan));
    println!("Network  : {}", detect_network(pan));
    println!("Luhn     : {}", if valid { "valid" } else { "invalid" });
    if !valid {
        bail!("card number failed validation");
    }
    Ok(())
}

fn print_version() {
    println!("cardvault {}", env!("CARGO_PKG_VERSION"));
    println!("engine    {}", ENGINE_VERSION);
}

// ---------------------------------------------------------------------------
// Ledger commands
// ---------------------------------------------------------------------------

async fn tokenize(global: &GlobalArgs, args: cli::TokenizeArgs) -> Result<()> {
    let session = secret_session(global, &args.secret.secret)?;

    let mut card = CardData::new(
        args.pan,
        args.cvv,
        args.expiry_month,
        args.expiry_year,
        args.name,
    );
    if let Some(network) = &args.network {
        card = card.with_network(network.parse().context("unknown card network")?);
    }

    let token = session
        .tokenize_and_store(&card)
        .await
        .context("tokenization failed")?;
    print_json(&token)
}

async fn retrieve(global: &GlobalArgs, secret: &str) -> Result<()> {
    let session = secret_session(global, secret)?;
    match session.retrieve().await.context("retrieve failed")? {
        Some(token) => print_json(&token),
        None => {
            println!("no token stored for {}", display_address(&session));
            Ok(())
        }
    }
}

async fn revoke(global: &GlobalArgs, secret: &str) -> Result<()> {
    let session = secret_session(global, secret)?;
    let outcome = session.revoke().await;
    print_json(&outcome)?;
    if let RevokeOutcome::Failed { reason } = outcome {
        bail!("revoke failed: {reason}");
    }
    Ok(())
}

async fn decrypt(global: &GlobalArgs, args: cli::DecryptArgs) -> Result<()> {
    let session = secret_session(global, &args.secret.secret)?;

    let card = match &args.payload {
        Some(payload) => {
            let bytes = hex::decode(payload.trim()).context("payload must be hex")?;
            session.decrypt_locally(&bytes).await
        }
        None => {
            let token = session
                .retrieve()
                .await
                .context("retrieve failed")?
                .context("no token stored for this secret")?;
            session.decrypt_token(&token).await
        }
    }
    .context("decryption failed")?;

    if args.reveal {
        print_json(&card)
    } else {
        println!("{:?}", card);
        Ok(())
    }
}

async fn status(global: &GlobalArgs, args: &IdentityArgs) -> Result<()> {
    let session = identity_session(global, args)?;
    match session.token_status().await.context("status query failed")? {
        Some(status) => println!("{status}"),
        None => println!("none"),
    }
    Ok(())
}

async fn mode_get(global: &GlobalArgs, args: &IdentityArgs) -> Result<()> {
    let session = identity_session(global, args)?;
    let mode = session.get_mode().await.context("mode query failed")?;
    println!("{mode}");
    Ok(())
}

async fn mode_set(global: &GlobalArgs, mode: &str, secret: &str) -> Result<()> {
    let mode: AccessMode = mode.parse().context("invalid access mode")?;
    let session = secret_session(global, secret)?;
    let tx_id = session
        .set_mode(mode)
        .await
        .context("mode change failed")?;
    println!("mode set to {mode} (tx {tx_id})");
    Ok(())
}

fn display_address(session: &VaultSession) -> String {
    session
        .address()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<none>".into())
}

//! Thin ops/debugging CLI over `ocmt-vault-core` (spec §6). Not the
//! product surface — it only calls into the library, carrying no business
//! logic of its own.

use std::env;
use std::io::{self, Write};
use std::sync::Arc;

use ocmt_vault_core::adapters::{ClockAdapter, SystemClock, SystemEntropy};
use ocmt_vault_core::approval::AlwaysDenyGateway;
use ocmt_vault_core::relay::NullRelayClient;
use ocmt_vault_core::vault::{VaultConfig, VaultStore};
use ocmt_vault_core::vault_service::VaultCore;

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = env::args().skip(1);
    let command = match args.next() {
        Some(cmd) => cmd,
        None => {
            print_usage();
            std::process::exit(2);
        }
    };

    let vault_path = env::var("OCMT_VAULT_PATH").unwrap_or_else(|_| "vault.json".to_string());
    let clock = SystemClock;
    let store = VaultStore::new(vault_path, VaultConfig::default());
    let core = VaultCore::new(store, Arc::new(NullRelayClient), Arc::new(AlwaysDenyGateway));

    let result = match command.as_str() {
        "initialize" => cmd_initialize(&core, &clock),
        "unlock" => cmd_unlock(&core, &clock),
        "lock" => cmd_lock(&core),
        "status" => cmd_status(&core, &clock),
        "rotate-key" => cmd_rotate_key(&core, &clock),
        "reissue" => cmd_reissue(&core, args.next(), &clock),
        other => {
            eprintln!("unknown command: {other}");
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn print_usage() {
    eprintln!("usage: vaultctl <initialize|unlock|lock|status|rotate-key|reissue <id>>");
}

fn read_password(prompt: &str) -> String {
    print!("{prompt}: ");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().read_line(&mut line).expect("failed to read password");
    line.trim_end_matches(['\n', '\r']).to_string()
}

fn cmd_initialize(core: &VaultCore, clock: &SystemClock) -> ocmt_vault_core::VaultResult<()> {
    let password = read_password("new vault password");
    let entropy = SystemEntropy;
    core.initialize(password.as_bytes(), &entropy, clock)?;
    println!("vault initialized");
    Ok(())
}

fn cmd_unlock(core: &VaultCore, clock: &SystemClock) -> ocmt_vault_core::VaultResult<()> {
    let password = read_password("vault password");
    core.unlock(password.as_bytes(), clock)?;
    println!("vault unlocked");
    Ok(())
}

fn cmd_lock(core: &VaultCore) -> ocmt_vault_core::VaultResult<()> {
    core.lock()?;
    println!("vault locked");
    Ok(())
}

fn cmd_status(core: &VaultCore, clock: &SystemClock) -> ocmt_vault_core::VaultResult<()> {
    let status = core.status(clock.now_ms());
    println!("{}", serde_json::to_string_pretty(&status).unwrap_or_default());
    Ok(())
}

fn cmd_rotate_key(core: &VaultCore, clock: &SystemClock) -> ocmt_vault_core::VaultResult<()> {
    core.rotate_signing_key(clock.now_ms())?;
    println!("signing key rotated");
    Ok(())
}

fn cmd_reissue(core: &VaultCore, id: Option<String>, clock: &SystemClock) -> ocmt_vault_core::VaultResult<()> {
    let id = id.unwrap_or_else(|| {
        eprintln!("reissue requires a capability id");
        std::process::exit(2);
    });
    let token = core.reissue(&id, 24 * 60 * 60 * 1000, clock.now_ms())?;
    println!("{}", serde_json::to_string_pretty(&token).unwrap_or_default());
    Ok(())
}

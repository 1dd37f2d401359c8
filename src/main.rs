// sftp-access 命令行入口

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use sftp_access::models::ClientSettings;
use sftp_access::services::sftp::worker_runtime;
use sftp_access::services::{storage, FileAccessService, HostTrustStore, KeyIdentity, SshConnector};
use sftp_access::ssh::{
    ConnectionPool, HostKeyAction, HostKeyDecider, HostKeyPrompt, HostKeyVerdict, RetryPolicy,
};

#[derive(Parser)]
#[command(name = "sftp-access", version, about = "SFTP file access with trust-on-first-use host keys")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the local Ed25519 identity
    Keygen {
        /// Replace an existing key
        #[arg(long)]
        force: bool,
    },
    /// Print the public key in OpenSSH format
    Pubkey,
    /// List a remote directory
    Ls {
        host: String,
        path: String,
        #[arg(short, long, default_value_t = 22)]
        port: u16,
    },
    /// Print a remote file to stdout
    Cat {
        host: String,
        path: String,
        #[arg(short, long, default_value_t = 22)]
        port: u16,
    },
    /// Print the size of a remote file
    Stat {
        host: String,
        path: String,
        #[arg(short, long, default_value_t = 22)]
        port: u16,
    },
    /// List trusted hosts
    Hosts,
    /// Remove a trusted host key
    Forget {
        host: String,
        #[arg(short, long, default_value_t = 22)]
        port: u16,
    },
}

/// 在终端询问用户是否信任主机密钥
struct PromptDecider;

#[async_trait]
impl HostKeyDecider for PromptDecider {
    async fn decide(&self, prompt: HostKeyPrompt) -> HostKeyAction {
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            if prompt.verdict == HostKeyVerdict::Changed {
                let _ = writeln!(
                    stderr,
                    "WARNING: the host key for {}:{} has CHANGED. Someone could be intercepting the connection.",
                    prompt.host, prompt.port
                );
            } else {
                let _ = writeln!(
                    stderr,
                    "The authenticity of host {}:{} can't be established.",
                    prompt.host, prompt.port
                );
            }
            let _ = writeln!(stderr, "{} key fingerprint is {}.", prompt.key_type, prompt.fingerprint);
            let _ = write!(stderr, "Trust this key and continue connecting? [y/N] ");
            let _ = stderr.flush();

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).ok()?;
            Some(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
        })
        .await;

        match answer {
            Ok(Some(true)) => HostKeyAction::Accept,
            _ => HostKeyAction::Reject,
        }
    }
}

fn service(settings: ClientSettings, handle: tokio::runtime::Handle) -> Result<FileAccessService> {
    let identity = Arc::new(KeyIdentity::open_default()?);
    let trust_store = Arc::new(HostTrustStore::open_default()?);
    let connector = Arc::new(SshConnector::new(identity, trust_store, Arc::new(PromptDecider)));
    let policy = RetryPolicy::from_settings(&settings);
    let pool = Arc::new(ConnectionPool::new(connector, settings));
    Ok(FileAccessService::new(pool, policy, handle))
}

fn main() -> Result<()> {
    // 初始化日志系统
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = storage::load_settings()?;
    // 首次运行时写出默认设置，方便用户修改
    if !storage::get_settings_file()?.exists() {
        storage::save_settings(&settings)?;
    }

    match cli.command {
        Command::Keygen { force } => {
            let identity = KeyIdentity::open_default()?;
            if identity.has_identity() && !force {
                bail!(
                    "a key already exists at {}; pass --force to replace it",
                    identity.private_key_path().display()
                );
            }
            identity.generate()?;
            if let Some(line) = identity.public_key_openssh() {
                println!("{}", line);
            }
        }
        Command::Pubkey => {
            let identity = KeyIdentity::open_default()?;
            let line = identity
                .public_key_openssh()
                .context("no key generated yet, run `sftp-access keygen` first")?;
            println!("{}", line);
        }
        Command::Hosts => {
            let store = HostTrustStore::open_default()?;
            for host in store.entries() {
                println!("{}\t{}\t{}", host.host, host.fingerprint, host.last_used);
            }
        }
        Command::Forget { host, port } => {
            let store = HostTrustStore::open_default()?;
            let id = sftp_access::services::host_id(&host, port);
            if !store.remove(&id)? {
                bail!("{} is not a trusted host", id);
            }
        }
        Command::Ls { host, path, port } => {
            let runtime = worker_runtime().context("failed to start worker runtime")?;
            let svc = service(settings, runtime.handle().clone())?;
            let result = runtime.block_on(async {
                let entries = svc.list(&host, port, &path).await;
                svc.shutdown().await?;
                entries
            });
            for entry in result? {
                println!(
                    "{} {:>8} {} {}",
                    entry.format_permissions(),
                    entry.format_size(),
                    entry.format_modified(),
                    entry.name
                );
            }
        }
        Command::Cat { host, path, port } => {
            let runtime = worker_runtime().context("failed to start worker runtime")?;
            let svc = service(settings, runtime.handle().clone())?;
            let content = runtime.block_on(async {
                let content = svc.read(&host, port, &path).await;
                svc.shutdown().await?;
                content
            })?;
            std::io::stdout().lock().write_all(&content)?;
        }
        Command::Stat { host, path, port } => {
            let runtime = worker_runtime().context("failed to start worker runtime")?;
            let svc = service(settings, runtime.handle().clone())?;
            let size = runtime.block_on(async {
                let size = svc.stat(&host, port, &path).await;
                svc.shutdown().await?;
                size
            })?;
            println!("{}", size);
        }
    }

    Ok(())
}

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use tokio::fs;

use guestlink::errors::NonUtf8PathError;
use guestlink::policy::EffectiveGuestLinkState;
use guestlink::{
    Client, DateTime, ExpirationChoice, FileLifetimePolicy, FileSize, GuestLink, GuestLinkConfig,
    GuestLinkId, GuestLinkLabel, RequestedExpiration, Upload, UploadOutcome, Utc,
};

/// Calculate default database path based on OS.
fn default_database_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("", "guestlink", "guestlink") {
        proj_dirs.data_dir().join("guestlink.sqlite")
    } else {
        PathBuf::from(".guestlink").join("guestlink.sqlite")
    }
}

/// CLI interface of Guestlink.
#[derive(Parser, Clone, Debug)]
#[command(version, about = "Guest upload link administration")]
pub struct Cli {
    /// Path to guest link database file.
    #[arg(
        short = 'd',
        long,
        value_name = "PATH",
        env = "GUESTLINK_DATABASE",
        default_value = default_database_path().into_os_string(),
    )]
    database: PathBuf,

    /// Command to execute.
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let database = self
            .database
            .as_os_str()
            .to_str()
            .ok_or(NonUtf8PathError)
            .context("failed to open database file")?;

        // Ensure database file has its parent directory
        if let Some(parent_dir) = self.database.parent() {
            fs::create_dir_all(parent_dir)
                .await
                .context("failed to create database directory")?;
        }

        let mut client = Client::init(database)
            .await
            .context("failed to initialize Guestlink client")?;

        self.command.execute(&mut client).await
    }
}

/// Guestlink commands.
#[derive(Clone, Debug, clap::Subcommand)]
pub enum Command {
    /// Create a new guest link.
    Create {
        /// Display text of the link.
        #[arg(long)]
        label: Option<String>,

        /// When the link stops accepting uploads, RFC 3339 timestamp.
        #[arg(long, value_name = "TIMESTAMP")]
        url_expires: Option<DateTime<Utc>>,

        /// Lifetime of uploaded files, e.g. `7d`, `1y` or `unrestricted`.
        #[arg(long, value_name = "LIFETIME", default_value = "unrestricted")]
        file_lifetime: FileLifetimePolicy,

        /// Per-file size limit in bytes.
        #[arg(long, value_name = "BYTES")]
        max_file_bytes: Option<i64>,

        /// Total number of uploads the link accepts.
        #[arg(long, value_name = "COUNT")]
        max_file_uploads: Option<i64>,
    },

    /// List all guest links.
    List,

    /// Show guest link state and the expirations an uploader may choose.
    Show {
        /// Guest link ID.
        id: GuestLinkId,
    },

    /// Block uploads through a guest link.
    Disable {
        /// Guest link ID.
        id: GuestLinkId,
    },

    /// Let a disabled guest link accept uploads again.
    Enable {
        /// Guest link ID.
        id: GuestLinkId,
    },

    /// Delete a guest link. Uploaded files keep their expiration.
    Delete {
        /// Guest link ID.
        id: GuestLinkId,
    },

    /// Record an upload through a guest link.
    Upload {
        /// Guest link ID.
        id: GuestLinkId,

        /// File size in bytes.
        #[arg(long, value_name = "BYTES")]
        size: u64,

        /// Expiration choice, e.g. `7d`, `1y` or `never`. Link default if omitted.
        #[arg(long, value_name = "CHOICE", conflicts_with = "expires_at")]
        expires: Option<ExpirationChoice>,

        /// Custom expiration, RFC 3339 timestamp.
        #[arg(long, value_name = "TIMESTAMP")]
        expires_at: Option<DateTime<Utc>>,
    },

    /// List uploads made through a guest link.
    Uploads {
        /// Guest link ID.
        id: GuestLinkId,
    },
}

impl Command {
    pub async fn execute(&self, client: &mut Client) -> anyhow::Result<()> {
        let now = Utc::now();
        match self {
            Self::Create {
                label,
                url_expires,
                file_lifetime,
                max_file_bytes,
                max_file_uploads,
            } => {
                let mut builder = GuestLinkConfig::builder();
                builder.created(now).file_lifetime(*file_lifetime);
                if let Some(label) = label {
                    builder.label(GuestLinkLabel::new(label.as_str())?);
                }
                if let Some(url_expires) = url_expires {
                    builder.url_expires(*url_expires);
                }
                if let Some(bytes) = max_file_bytes {
                    builder.max_file_bytes(*bytes);
                }
                if let Some(count) = max_file_uploads {
                    builder.max_file_uploads(*count);
                }
                let config = builder.build()?;
                let link = client
                    .create_guest_link(config)
                    .await
                    .context("failed to create guest link")?;
                println!("{}", link.id());
            }
            Self::List => {
                for link in client.list_guest_links().await? {
                    print_guest_link(&link);
                }
            }
            Self::Show { id } => {
                let link = client.load_guest_link(id).await?;
                let state = client.guest_link_state(id, now).await?;
                print_guest_link(&link);
                print_state(&state);
            }
            Self::Disable { id } => {
                client.disable_guest_link(id).await?;
            }
            Self::Enable { id } => {
                client.enable_guest_link(id).await?;
            }
            Self::Delete { id } => {
                client.delete_guest_link(id).await?;
            }
            Self::Upload {
                id,
                size,
                expires,
                expires_at,
            } => {
                let requested = match (expires, expires_at) {
                    (_, Some(at)) => RequestedExpiration::Custom(*at),
                    (Some(choice), None) => RequestedExpiration::Choice(*choice),
                    (None, None) => RequestedExpiration::Default,
                };
                let size = FileSize::for_upload(*size)?;
                match client.record_upload(id, size, requested, now).await? {
                    UploadOutcome::Accepted { usage, upload } => {
                        print_upload(&upload);
                        println!("uploads consumed: {}", usage.uploads_consumed);
                    }
                    UploadOutcome::Rejected(rejection) => anyhow::bail!(rejection),
                }
            }
            Self::Uploads { id } => {
                for upload in client.uploads_for_guest_link(id).await? {
                    print_upload(&upload);
                }
            }
        }
        Ok(())
    }
}

fn print_guest_link(link: &GuestLink) {
    let config = &link.config;
    let or_unlimited = |value: Option<i64>| value.map_or("unlimited".to_string(), |v| v.to_string());
    println!("{}", config.id);
    if let Some(label) = &config.label {
        println!("  label: {}", label);
    }
    println!("  created: {}", config.created);
    if let Some(url_expires) = config.url_expires {
        println!("  link expires: {}", url_expires);
    }
    println!("  file lifetime: {}", config.file_lifetime);
    match config.max_file_size() {
        Some(size) => println!("  max file size: {}", size),
        None => println!("  max file size: {}", or_unlimited(config.max_file_bytes)),
    }
    println!(
        "  uploads: {} of {}",
        link.usage.uploads_consumed,
        or_unlimited(config.max_file_uploads)
    );
    if link.usage.is_disabled {
        println!("  disabled");
    }
}

fn print_state(state: &EffectiveGuestLinkState) {
    println!("  status: {}", state.status);
    let choices = state
        .allowed_expiration_choices
        .iter()
        .map(|choice| {
            if *choice == state.default_expiration_choice {
                format!("[{}]", choice)
            } else {
                choice.to_string()
            }
        })
        .collect::<Vec<_>>();
    println!("  expiration choices: {}", choices.join(", "));
}

fn print_upload(upload: &Upload) {
    let expires = upload
        .expires
        .map_or("never".to_string(), |expires| expires.to_string());
    println!(
        "upload {}: {}, uploaded {}, expires {}",
        upload.id, upload.size, upload.uploaded, expires
    );
}

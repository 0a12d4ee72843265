use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use gridstore::{
    Config, FileId, FileRecord, Filter, FindOptions, Metadata, Revision, SortOrder, UploadOptions,
    UploadSource,
};

use crate::storage_manager::StorageManager;

#[derive(Parser)]
#[command(name = "gridstore")]
#[command(about = "Chunked file storage with revisioned filenames", long_about = None)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[arg(long, global = true)]
    database: Option<String>,

    /// Bucket prefix
    #[arg(short, long, global = true)]
    prefix: Option<String>,

    /// Chunk size for new uploads, in bytes
    #[arg(long, global = true)]
    chunk_size: Option<u32>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Config file and environment first, command line flags last.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(root) = &self.root {
            config.database.root = root.clone();
        }
        if let Some(database) = &self.database {
            config.database.name = database.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.bucket.bucket_name = prefix.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            config.bucket.chunk_size_bytes = chunk_size;
        }
        config.bucket.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a file to storage
    Put {
        file: PathBuf,

        /// Stored filename; defaults to the file's own name
        #[arg(short = 'n', long = "name")]
        name: Option<String>,

        #[arg(long)]
        content_type: Option<String>,

        /// Extra metadata as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Download a file into a directory
    Get {
        #[arg(short = 'i', long = "file-id")]
        file_id: Option<String>,

        #[arg(short = 'n', long = "file-name")]
        file_name: Option<String>,

        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        revision: i64,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a file's content to stdout
    Cat {
        #[arg(short = 'i', long = "file-id")]
        file_id: Option<String>,

        #[arg(short = 'n', long = "file-name")]
        file_name: Option<String>,

        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        revision: i64,
    },

    /// List files in the bucket
    List {
        #[arg(short = 'n', long = "file-name")]
        file_name: Option<String>,
    },

    /// Print a file record as JSON
    Info {
        #[arg(short = 'i', long = "file-id")]
        file_id: String,
    },

    Rename {
        #[arg(short = 'i', long = "file-id")]
        file_id: String,

        #[arg(short = 'n', long = "name")]
        name: String,
    },

    /// Delete a file and its chunks
    Delete {
        #[arg(short = 'i', long = "file-id")]
        file_id: String,
    },

    /// Delete every file in the bucket
    Drop {
        #[arg(long)]
        yes: bool,
    },

    /// Check a file's chunks against its record
    Verify {
        #[arg(short = 'i', long = "file-id")]
        file_id: String,
    },
}

enum Source {
    Id(FileId),
    Name(String, Revision),
}

fn parse_id(raw: &str) -> anyhow::Result<FileId> {
    raw.parse()
        .with_context(|| format!("invalid file id: {}", raw))
}

fn pick_source(file_id: Option<String>, file_name: Option<String>, revision: i64) -> anyhow::Result<Source> {
    match (file_id, file_name) {
        (Some(id), _) => Ok(Source::Id(parse_id(&id)?)),
        (None, Some(name)) => Ok(Source::Name(name, Revision(revision))),
        _ => bail!("Either file ID or file name must be provided"),
    }
}

fn print_record(record: &FileRecord) {
    println!(
        "{}\t{}\t{}\t{}",
        record.id,
        record.filename,
        record.length,
        record.upload_date.to_rfc3339()
    );
}

pub async fn execute_command(storage: &StorageManager, command: Commands) -> anyhow::Result<()> {
    let bucket = storage.bucket()?;

    match command {
        Commands::Put { file, name, content_type, metadata } => {
            let filename = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow!("Invalid filename: {}", file.display()))?
                    .to_string(),
            };
            let mut options = UploadOptions::default();
            if let Some(content_type) = content_type {
                options = options.with_content_type(&content_type);
            }
            if let Some(raw) = metadata {
                let metadata: Metadata =
                    serde_json::from_str(&raw).context("metadata must be a JSON object")?;
                options = options.with_metadata(metadata);
            }
            let source = UploadSource::Path { path: file, remove_after: false };
            let record = bucket.upload(&filename, source, options).await?;
            println!("{}", record.id);
        }
        Commands::Get { file_id, file_name, revision, output } => {
            let path = match pick_source(file_id, file_name, revision)? {
                Source::Id(id) => bucket.download_to_path(&id, &output).await?,
                Source::Name(name, revision) => {
                    bucket.download_to_path_by_name(&name, revision, &output).await?
                }
            };
            println!("File downloaded to {}", path.display());
        }
        Commands::Cat { file_id, file_name, revision } => {
            let stream = match pick_source(file_id, file_name, revision)? {
                Source::Id(id) => bucket.open_download_stream(&id).await?,
                Source::Name(name, revision) => {
                    bucket.open_download_stream_by_name(&name, revision).await?
                }
            };
            let mut stdout = tokio::io::stdout();
            stream.copy_to(&mut stdout).await?;
        }
        Commands::List { file_name } => {
            let filter = match file_name {
                Some(name) => Filter::by_filename(&name),
                None => Filter::new(),
            };
            let options = FindOptions::default()
                .sort_by("filename", SortOrder::Ascending)
                .sort_by("uploadDate", SortOrder::Ascending);
            for record in bucket.find(&filter, &options).await? {
                print_record(&record);
            }
        }
        Commands::Info { file_id } => {
            let record = bucket.get_file(&parse_id(&file_id)?).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Rename { file_id, name } => {
            let record = bucket.rename(&parse_id(&file_id)?, &name).await?;
            print_record(&record);
        }
        Commands::Delete { file_id } => {
            if bucket.delete(&parse_id(&file_id)?).await? {
                println!("Deleted {}", file_id);
            } else {
                bail!("File not found: {}", file_id);
            }
        }
        Commands::Drop { yes } => {
            if !yes {
                bail!("Refusing to drop bucket {} without --yes", bucket.bucket_name());
            }
            bucket.drop_bucket().await?;
            println!("Dropped bucket {}", bucket.bucket_name());
        }
        Commands::Verify { file_id } => {
            let report = bucket.validate(&parse_id(&file_id)?).await?;
            println!("OK {} chunks, {} bytes", report.chunks, report.bytes);
        }
    }

    Ok(())
}

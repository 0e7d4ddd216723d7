//! CAPR command line interface.
//!
//! Thin shell over `capr-core`: resolves configuration once at startup, then
//! dispatches to the registry service. Restore and import run as a dry run by
//! default, printing the reconciliation summary; writes happen only with
//! `--apply` (import) or without `--dry-run` (restore).

use capr_core::settings::{FsSettingsRemote, SettingsProvider};
use capr_core::{
    config, CoreConfig, PatientRecord, Reconciliation, RecordId, RegistryService, SnapshotTrigger,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capr")]
#[command(about = "CAPR pneumonia registry CLI")]
struct Cli {
    /// Registry data directory (falls back to CAPR_DATA_DIR, then ./capr_data)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all patient records
    List,
    /// Create a patient record
    Create {
        /// Hospital record number (the natural key)
        hospital_code: String,
        /// Patient name
        name: String,
        #[arg(long)]
        age: Option<u32>,
        #[arg(long)]
        sex: Option<String>,
        #[arg(long)]
        ward: Option<String>,
        /// Admission date (YYYY-MM-DD)
        #[arg(long)]
        admission_date: Option<String>,
    },
    /// Delete a patient record (takes an automatic backup first)
    Delete {
        /// Record id
        id: String,
    },
    /// Snapshot backup management
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Reconcile a snapshot against the live collection and optionally apply it
    Restore {
        /// Snapshot id
        snapshot_id: String,
        /// Also overwrite conflicting records with the snapshot's version
        #[arg(long)]
        include_conflicts: bool,
        /// Only print the reconciliation summary; write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Export all records to a CSV file
    Export {
        /// Output file path
        path: PathBuf,
    },
    /// Reconcile a CSV file against the live collection and optionally apply it
    Import {
        /// Input file path
        path: PathBuf,
        /// Apply new records (and conflicts with --include-conflicts)
        #[arg(long)]
        apply: bool,
        /// Also overwrite conflicting records with the sheet's version
        #[arg(long)]
        include_conflicts: bool,
    },
    /// Configuration list management
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Take a manual snapshot of the whole collection
    Create {
        /// Display name for the snapshot
        #[arg(long, default_value = "Manual backup")]
        name: String,
    },
    /// List snapshots, newest first
    List,
    /// Rename a snapshot
    Rename {
        /// Snapshot id
        id: String,
        /// New display name
        name: String,
    },
    /// Delete a snapshot
    Delete {
        /// Snapshot id
        id: String,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print one configuration list
    Get { key: String },
    /// Replace one configuration list (comma-separated values)
    Set { key: String, values: String },
}

fn print_reconciliation(reconciliation: &Reconciliation) {
    println!(
        "{} incoming: {} new, {} identical, {} conflicting",
        reconciliation.total(),
        reconciliation.new_records.len(),
        reconciliation.identical.len(),
        reconciliation.conflicts.len()
    );
    for pair in &reconciliation.conflicts {
        println!(
            "  conflict on '{}' ({} fields):",
            pair.incoming.hospital_record_code,
            pair.diffs.len()
        );
        for diff in &pair.diffs {
            println!(
                "    {}: {} -> {}",
                diff.label, diff.old_value, diff.new_value
            );
        }
    }
}

/// Assembles the write batch from a reconciliation: new records always,
/// approved conflicts optionally, identical records never.
fn restore_batch(reconciliation: Reconciliation, include_conflicts: bool) -> Vec<PatientRecord> {
    let mut batch = reconciliation.new_records;
    if include_conflicts {
        batch.extend(reconciliation.conflicts.into_iter().map(|pair| pair.incoming));
    }
    batch
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .or_else(|| std::env::var("CAPR_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./capr_data"));
    let prefix =
        config::study_code_prefix_from_env_value(std::env::var("CAPR_STUDY_CODE_PREFIX").ok());
    let cfg = Arc::new(CoreConfig::new(data_dir, prefix)?);
    let service = RegistryService::new(cfg.clone())?;

    match cli.command {
        Commands::List => {
            let patients = service.list_patients()?;
            if patients.is_empty() {
                println!("No patients found.");
            } else {
                for patient in patients {
                    println!(
                        "{}  {}  {}  {}",
                        patient
                            .id
                            .as_ref()
                            .map(|id| id.to_string())
                            .unwrap_or_default(),
                        patient.study_code,
                        patient.hospital_record_code,
                        patient.administrative.patient_name
                    );
                }
            }
        }
        Commands::Create {
            hospital_code,
            name,
            age,
            sex,
            ward,
            admission_date,
        } => {
            let mut record = PatientRecord {
                hospital_record_code: hospital_code,
                ..Default::default()
            };
            record.administrative.patient_name = name;
            record.administrative.age = age;
            record.administrative.sex = sex.unwrap_or_default();
            record.administrative.ward = ward.unwrap_or_default();
            record.administrative.admission_date = admission_date.unwrap_or_default();

            let stored = service.create_patient(&record)?;
            println!(
                "Created {} with study code {}",
                stored
                    .id
                    .as_ref()
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                stored.study_code
            );
        }
        Commands::Delete { id } => {
            let id = RecordId::parse(&id)?;
            service.delete_patient(&id)?;
            println!("Deleted {id}");
        }
        Commands::Backup { command } => match command {
            BackupCommands::Create { name } => {
                let records = service.list_patients()?;
                let metadata = service.snapshots().create_snapshot(
                    &records,
                    &name,
                    SnapshotTrigger::Manual,
                )?;
                println!(
                    "Snapshot {} created: {} records, {} bytes",
                    metadata.id, metadata.patient_count, metadata.file_size
                );
            }
            BackupCommands::List => {
                let snapshots = service.snapshots().list()?;
                if snapshots.is_empty() {
                    println!("No snapshots found.");
                } else {
                    for metadata in snapshots {
                        println!(
                            "{}  {}  {} records  {:?}  {}",
                            metadata.id,
                            metadata.created_at.to_rfc3339(),
                            metadata.patient_count,
                            metadata.trigger,
                            metadata.name
                        );
                    }
                }
            }
            BackupCommands::Rename { id, name } => {
                let id = RecordId::parse(&id)?;
                service.snapshots().rename(&id, &name)?;
                println!("Renamed {id}");
            }
            BackupCommands::Delete { id } => {
                let id = RecordId::parse(&id)?;
                service.snapshots().delete(&id)?;
                println!("Deleted snapshot {id}");
            }
        },
        Commands::Restore {
            snapshot_id,
            include_conflicts,
            dry_run,
        } => {
            let id = RecordId::parse(&snapshot_id)?;
            let reconciliation = service.reconcile_snapshot(&id)?;
            print_reconciliation(&reconciliation);

            if !dry_run {
                let batch = restore_batch(reconciliation, include_conflicts);
                let outcome = service.restore(&batch)?;
                println!(
                    "Applied: {} created, {} updated",
                    outcome.created, outcome.updated
                );
            }
        }
        Commands::Export { path } => {
            let count = service.export_csv(&path)?;
            println!("Exported {count} records to {}", path.display());
        }
        Commands::Import {
            path,
            apply,
            include_conflicts,
        } => {
            let reconciliation = service.reconcile_spreadsheet(&path)?;
            print_reconciliation(&reconciliation);

            if apply {
                let batch = restore_batch(reconciliation, include_conflicts);
                let outcome = service.restore(&batch)?;
                println!(
                    "Applied: {} created, {} updated",
                    outcome.created, outcome.updated
                );
            } else {
                println!("Dry run; re-run with --apply to write.");
            }
        }
        Commands::Settings { command } => {
            let provider = SettingsProvider::new(
                cfg.settings_cache_path(),
                FsSettingsRemote::new(cfg.data_dir().join("settings.yaml")),
            );
            match command {
                SettingsCommands::Get { key } => match provider.get_list(&key)? {
                    Some(values) => println!("{}", values.join(", ")),
                    None => println!("No list configured for '{key}'."),
                },
                SettingsCommands::Set { key, values } => {
                    let values: Vec<String> = values
                        .split(',')
                        .map(|value| value.trim().to_string())
                        .filter(|value| !value.is_empty())
                        .collect();
                    provider.set_list(&key, &values)?;
                    println!("Updated '{key}' ({} entries).", values.len());
                }
            }
        }
    }

    Ok(())
}

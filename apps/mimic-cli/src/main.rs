use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;

use dataset_convert::consolidate::{DEFAULT_DATA_FILE_SIZE_MB, DEFAULT_VIDEO_FILE_SIZE_MB};
use dataset_convert::hub::HubClient;
use dataset_convert::merge::merge_sources;
use dataset_convert::{ConvertOptions, Converter};
use train_orchestrator::sequence::Backend;
use train_orchestrator::{
    DatasetGroups, HostTable, Orchestrator, ParamOverrides, PolicyRegistry, SlurmScheduler,
    TrainRequest,
};

#[derive(Parser, Debug)]
#[command(
    name = "mimic",
    version,
    about = "Mimic Robotics deployment CLI",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch training jobs over policies and dataset groups
    Train {
        /// Policy types to train, comma-separated
        #[arg(long, value_delimiter = ',', required = true)]
        policies: Vec<String>,
        /// Dataset groups to train on, comma-separated
        #[arg(long, value_delimiter = ',')]
        groups: Vec<String>,
        /// Single explicit dataset id (bypasses group resolution)
        #[arg(long)]
        dataset: Option<String>,
        /// Compute host the jobs run on
        #[arg(long, default_value = "workstation")]
        host: String,
        #[arg(long)]
        batch_size: Option<u32>,
        #[arg(long)]
        num_workers: Option<u32>,
        #[arg(long)]
        steps: Option<u64>,
        /// Push the trained policy to the hub when training finishes
        #[arg(long, action = ArgAction::SetTrue)]
        push: bool,
        /// Detach each job, writing output to a per-job log file
        #[arg(long, action = ArgAction::SetTrue)]
        background: bool,
        /// Wait for each job before launching the next
        #[arg(long, action = ArgAction::SetTrue)]
        blocking: bool,
        /// Submit through the batch scheduler instead of running locally
        #[arg(long, action = ArgAction::SetTrue)]
        slurm: bool,
        /// Print the planned jobs without launching anything
        #[arg(long, action = ArgAction::SetTrue)]
        dry_run: bool,
        #[arg(long, default_value = "configs/dataset_groups.yaml")]
        groups_file: PathBuf,
        /// Host defaults table; built-in table when the file is absent
        #[arg(long, default_value = "configs/hosts.yaml")]
        hosts_file: PathBuf,
        #[arg(long, default_value = "logs")]
        logs_dir: PathBuf,
        #[arg(long, default_value = "outputs")]
        outputs_dir: PathBuf,
    },
    /// Convert a v2.1 dataset (or several, merged) to the v3.0 schema
    Convert {
        /// Source dataset repo id(s); several are merged in order
        #[arg(required = true)]
        sources: Vec<String>,
        /// Destination dataset repo id
        #[arg(long)]
        dest: String,
        /// Keep the converted dataset local, do not publish
        #[arg(long, action = ArgAction::SetTrue)]
        no_push: bool,
        /// Keep the working directory after a successful push
        #[arg(long, action = ArgAction::SetTrue)]
        keep_temp: bool,
        #[arg(long, default_value_t = DEFAULT_DATA_FILE_SIZE_MB)]
        data_file_size_mb: u64,
        #[arg(long, default_value_t = DEFAULT_VIDEO_FILE_SIZE_MB)]
        video_file_size_mb: u64,
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Concurrent ffmpeg processes during the camera remap
        #[arg(long, default_value_t = 4)]
        parallelism: usize,
    },
    /// Merge local v2.1 datasets into one, renumbering episodes
    Merge {
        /// Local dataset directories, merged in order
        #[arg(required = true)]
        sources: Vec<PathBuf>,
        /// Output directory for the merged dataset
        #[arg(long)]
        out: PathBuf,
    },
    /// Inspect dataset groups
    Groups {
        #[command(subcommand)]
        action: GroupsAction,
    },
    /// Inspect known policy types
    Policies {
        #[command(subcommand)]
        action: PoliciesAction,
    },
    /// Robot hardware configuration
    Hardware {
        #[command(subcommand)]
        action: HardwareAction,
    },
}

#[derive(Subcommand, Debug)]
enum GroupsAction {
    /// List all groups and their dataset counts
    List {
        #[arg(long, default_value = "configs/dataset_groups.yaml")]
        groups_file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum PoliciesAction {
    /// List all known policy types
    List,
}

#[derive(Subcommand, Debug)]
enum HardwareAction {
    /// Print the parsed hardware configuration
    Show {
        #[arg(long, default_value = "configs/robot.yaml")]
        config: PathBuf,
    },
    /// Render udev rules for stable device names
    UdevRules {
        #[arg(long, default_value = "configs/robot.yaml")]
        config: PathBuf,
        /// Write the rules to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            policies,
            groups,
            dataset,
            host,
            batch_size,
            num_workers,
            steps,
            push,
            background,
            blocking,
            slurm,
            dry_run,
            groups_file,
            hosts_file,
            logs_dir,
            outputs_dir,
        } => {
            let orchestrator = Orchestrator {
                groups: DatasetGroups::load(&groups_file)
                    .with_context(|| format!("loading {}", groups_file.display()))?,
                policies: PolicyRegistry::default(),
                hosts: if hosts_file.is_file() {
                    HostTable::load(&hosts_file)?
                } else {
                    HostTable::default()
                },
            };
            let mut request = TrainRequest::new(policies, groups, host);
            request.dataset = dataset;
            request.overrides = ParamOverrides {
                batch_size,
                num_workers,
                steps,
            };
            request.push = push;
            request.blocking = blocking;
            request.backend = if slurm {
                Backend::Slurm
            } else if background {
                Backend::Background
            } else {
                Backend::Foreground
            };
            request.logs_dir = logs_dir.clone();
            request.outputs_dir = outputs_dir;

            if dry_run {
                let jobs = orchestrator.plan(&request)?;
                println!("{} job(s) planned:", jobs.len());
                for job in &jobs {
                    println!(
                        "  {}  [{} on {} datasets, batch {}, {} steps]",
                        job.job_id,
                        job.policy,
                        job.datasets.len(),
                        job.params.batch_size,
                        job.params.steps,
                    );
                    println!("    {}", job.command(&orchestrator.policies)?.join(" "));
                }
                return Ok(());
            }

            let scheduler = SlurmScheduler::new(&logs_dir);
            orchestrator.execute(&request, &scheduler).await?;
            info!("all jobs launched");
            Ok(())
        }
        Commands::Convert {
            sources,
            dest,
            no_push,
            keep_temp,
            data_file_size_mb,
            video_file_size_mb,
            work_dir,
            parallelism,
        } => {
            let mut options = ConvertOptions::new(sources, dest);
            options.push = !no_push;
            options.keep_work_dir = keep_temp;
            options.data_file_size_mb = data_file_size_mb;
            options.video_file_size_mb = video_file_size_mb;
            options.parallelism = parallelism;
            if let Some(work_dir) = work_dir {
                options.work_dir = work_dir;
            }

            let hub = match std::env::var("HF_TOKEN") {
                Ok(token) => HubClient::default().with_token(token),
                Err(_) => HubClient::default(),
            };
            let converted = Converter::new(hub).run(&options).await?;
            if !options.push {
                println!("{}", converted.display());
            }
            Ok(())
        }
        Commands::Merge { sources, out } => {
            let merged = merge_sources(&sources, &out)?;
            println!(
                "merged {} episodes / {} frames into {}",
                merged.total_episodes,
                merged.total_frames,
                out.display()
            );
            Ok(())
        }
        Commands::Groups { action } => match action {
            GroupsAction::List { groups_file } => {
                let groups = DatasetGroups::load(&groups_file)
                    .with_context(|| format!("loading {}", groups_file.display()))?;
                for (name, datasets) in groups.iter() {
                    println!("{name:24} ({} datasets)", datasets.len());
                }
                Ok(())
            }
        },
        Commands::Policies { action } => match action {
            PoliciesAction::List => {
                for name in PolicyRegistry::default().names() {
                    println!("{name}");
                }
                Ok(())
            }
        },
        Commands::Hardware { action } => match action {
            HardwareAction::Show { config } => {
                let config = robot_config::load_robot_config(&config)?;
                println!("{}", serde_yaml::to_string(&config)?);
                Ok(())
            }
            HardwareAction::UdevRules { config, out } => {
                let config = robot_config::load_robot_config(&config)?;
                let rules = robot_config::render_udev_rules(&config);
                match out {
                    Some(path) => {
                        std::fs::write(&path, rules)
                            .with_context(|| format!("writing {}", path.display()))?;
                        println!("wrote {}", path.display());
                    }
                    None => print!("{rules}"),
                }
                Ok(())
            }
        },
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

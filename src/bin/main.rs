//! kube-serve CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube_serving::labels::CorrelationLabels;
use kube_serving::{
    ContainerTemplate, DeleteOutcome, DeployedHandle, ExposureMode, JobLifecycle, KubeClusterApi,
    PodTemplateFactory, PredictionClient, ResourceSpecBuilder, ServingConfig, ServingOrchestrator,
    Tensor,
};

#[derive(Parser)]
#[command(name = "kube-serve")]
#[command(about = "Deploy trained models as prediction services on Kubernetes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a model image as a prediction service
    Deploy {
        /// Container image that hosts the model
        #[arg(short, long)]
        image: String,
        /// Name of the class implementing predict()
        #[arg(short, long)]
        serving_class: String,
        /// Service exposure: ClusterIP, NodePort or LoadBalancer
        #[arg(short, long, default_value = "NodePort", value_parser = parse_exposure)]
        exposure: ExposureMode,
        /// Target namespace
        #[arg(short, long, default_value = "default")]
        namespace: String,
        /// Extra label as key=value (repeatable)
        #[arg(short, long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
        /// Seconds to wait for a load balancer address
        #[arg(long, default_value = "300")]
        timeout: u64,
        /// Log the generated manifests before submitting
        #[arg(long)]
        log_manifests: bool,
        /// Write the deployment handle to this file
        #[arg(long, default_value = "serving-handle.json")]
        handle: PathBuf,
    },
    /// Delete a deployed prediction service
    Delete {
        /// Handle file written by `deploy`
        #[arg(long, default_value = "serving-handle.json")]
        handle: PathBuf,
    },
    /// Send a prediction request
    Predict {
        /// Endpoint URL returned by `deploy`
        #[arg(short, long)]
        url: String,
        /// Tensor shape, e.g. 1,37
        #[arg(short, long, value_delimiter = ',')]
        shape: Vec<usize>,
        /// Row-major values
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
        values: Vec<f64>,
        /// Feature names
        #[arg(long, value_delimiter = ',')]
        names: Option<Vec<String>>,
        /// Request timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
    /// Print the Deployment and Service that `deploy` would submit
    Manifest {
        #[arg(short, long)]
        image: String,
        #[arg(short, long)]
        serving_class: String,
        #[arg(short, long, default_value = "NodePort", value_parser = parse_exposure)]
        exposure: ExposureMode,
    },
}

fn parse_exposure(s: &str) -> Result<ExposureMode, String> {
    s.parse().map_err(|e: kube_serving::Error| e.to_string())
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy {
            image,
            serving_class,
            exposure,
            namespace,
            labels,
            timeout,
            log_manifests,
            handle,
        } => {
            let config = ServingConfig::builder()
                .namespace(namespace)
                .exposure_mode(exposure)
                .load_balancer_timeout(Duration::from_secs(timeout))
                .log_manifests(log_manifests)
                .build_validated()?;
            let extra: BTreeMap<String, String> = labels.into_iter().collect();
            cmd_deploy(config, &image, &serving_class, &extra, &handle)?;
        }
        Commands::Delete { handle } => {
            cmd_delete(&handle)?;
        }
        Commands::Predict {
            url,
            shape,
            values,
            names,
            timeout,
        } => {
            let client = PredictionClient::new(url, Duration::from_secs(timeout))?;
            let response = client.predict(Tensor::new(shape, values)?, names)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Manifest {
            image,
            serving_class,
            exposure,
        } => {
            cmd_manifest(&image, &serving_class, exposure)?;
        }
    }

    Ok(())
}

fn cmd_deploy(
    config: ServingConfig,
    image: &str,
    serving_class: &str,
    extra: &BTreeMap<String, String>,
    handle_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let exposure = config.exposure_mode;
    let orchestrator = ServingOrchestrator::new(KubeClusterApi::try_default()?, config)?;
    let template = ContainerTemplate::new(image).pod_template();

    match orchestrator.deploy(template, serving_class, exposure, extra) {
        Ok((handle, url)) => {
            handle.save(handle_path)?;
            println!("Prediction endpoint: {}", url);
            println!("Handle written to {}", handle_path.display());
            Ok(())
        }
        Err(e) => {
            if let Some(handle) = e.leaked_handle() {
                handle.save(handle_path)?;
                println!("Resources were created; handle written to {}", handle_path.display());
                println!("Run: kube-serve delete --handle {}", handle_path.display());
            }
            Err(e.into())
        }
    }
}

fn cmd_delete(handle_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let handle = DeployedHandle::load(handle_path)?;
    let config = ServingConfig::builder()
        .namespace(handle.network.namespace.clone())
        .build_validated()?;
    let orchestrator = ServingOrchestrator::new(KubeClusterApi::try_default()?, config)?;

    let report = orchestrator.delete(&handle);
    print_outcome("service", &handle.network.to_string(), &report.network);
    print_outcome("deployment", &handle.compute.to_string(), &report.compute);

    if !report.is_success() {
        return Err(format!("delete finished with status {:?}", report.status()).into());
    }
    Ok(())
}

fn print_outcome(kind: &str, name: &str, outcome: &DeleteOutcome) {
    match outcome {
        DeleteOutcome::Deleted => println!("Deleted {}: {}", kind, name),
        DeleteOutcome::Failed(e) => println!("Not able to delete {} {}: {}", kind, name, e),
        DeleteOutcome::Skipped => println!("Skipped {}: {}", kind, name),
    }
}

fn cmd_manifest(
    image: &str,
    serving_class: &str,
    exposure: ExposureMode,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServingConfig::default();
    let job = JobLifecycle::serving(&config.namespace);
    let builder = ResourceSpecBuilder::from_config(&config);

    let labels: CorrelationLabels = job.correlation_labels(&config.labels, &BTreeMap::new());
    let template = job.annotate_pod_template(ContainerTemplate::new(image).pod_template(), &labels);

    let deployment = builder.build_compute_spec(template, &labels, serving_class);
    let service = builder.build_network_spec(&labels, exposure);

    println!("{}", serde_json::to_string_pretty(&deployment)?);
    println!("{}", serde_json::to_string_pretty(&service)?);
    Ok(())
}

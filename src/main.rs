use std::sync::Arc;

use clap::Parser;
use kubedeployer::{
    config::{Command, DeployerProperties, Opts},
    container::ContainerFactory,
    deployer::{plan, KubernetesAppDeployer},
    kubestuff::KubeOrchestrator,
    request::DeploymentRequest,
    status::DeploymentState,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn load_properties(opts: &Opts) -> anyhow::Result<DeployerProperties> {
    let mut properties = match &opts.config {
        Some(path) => DeployerProperties::from_file(path)?,
        None => DeployerProperties::default(),
    };
    if let Some(namespace) = &opts.namespace {
        properties.namespace = namespace.clone();
    }
    Ok(properties)
}

async fn connect(
    properties: &Arc<DeployerProperties>,
) -> anyhow::Result<KubernetesAppDeployer<KubeOrchestrator>> {
    let orchestrator = KubeOrchestrator::try_default(properties.namespace.clone()).await?;
    Ok(KubernetesAppDeployer::new(Arc::clone(properties), orchestrator))
}

async fn inner_main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&opts.log)?)
        .init();

    let properties = Arc::new(load_properties(&opts)?);

    match opts.command {
        Command::Render { request } => {
            let request = DeploymentRequest::from_file(&request)?;
            let factory = ContainerFactory::new(properties);
            for workload in plan(&factory, &request)? {
                println!("---\n{}", serde_yaml::to_string(&workload)?);
            }
        }
        Command::Deploy { request, wait } => {
            let request = DeploymentRequest::from_file(&request)?;
            let deployer = connect(&properties).await?;
            let id = deployer.deploy(&request).await?;
            println!("{id}");
            if wait {
                let status = deployer
                    .wait_for(
                        &id,
                        |state| {
                            matches!(state, DeploymentState::Deployed | DeploymentState::Failed)
                        },
                        properties.deployment_timeout,
                    )
                    .await?;
                info!("{id} is {}", status.state());
                anyhow::ensure!(
                    status.state() == DeploymentState::Deployed,
                    "{id} did not become deployed, last state was {}",
                    status.state()
                );
            }
        }
        Command::Status { id } => {
            let deployer = connect(&properties).await?;
            let status = deployer.status(&id).await?;
            println!("{}: {}", status.deployment_id, status.state());
            for instance in &status.instances {
                println!("  {}: {}", instance.id, instance.state);
            }
        }
        Command::Undeploy { id } => {
            let deployer = connect(&properties).await?;
            deployer.undeploy(&id).await?;
            let status = deployer
                .wait_for(
                    &id,
                    |state| state == DeploymentState::Unknown,
                    properties.undeployment_timeout,
                )
                .await?;
            info!("{id} is {}", status.state());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = inner_main().await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

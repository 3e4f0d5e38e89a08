use kube::core::CustomResourceExt;
use workspace_admission::crd::{Workspace, WorkspaceAccessStrategy, WorkspaceTemplate};

fn main() -> anyhow::Result<()> {
    let crds = [
        Workspace::crd(),
        WorkspaceTemplate::crd(),
        WorkspaceAccessStrategy::crd(),
    ];
    let docs = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    println!("{}", docs.join("---\n"));
    Ok(())
}

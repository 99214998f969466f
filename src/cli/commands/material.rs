//! Material embedding command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::{follow, report, CommandContext, TrackerOutput};
use crate::cli::output::{truncate, CommandOutput};
use crate::domain::models::Material;
use crate::services::{JobPhase, TrackerView};

#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Material ID
    pub material_id: String,
}

#[derive(Debug, Serialize)]
pub struct MaterialDetail {
    pub id: String,
    pub filename: String,
    pub chunk_count: u32,
}

impl From<Material> for MaterialDetail {
    fn from(material: Material) -> Self {
        Self {
            id: material.id,
            filename: material.filename,
            chunk_count: material.chunk_count,
        }
    }
}

impl CommandOutput for TrackerOutput<MaterialDetail> {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Embedding of {}: {:?}", self.entity_id, self.phase)];
        if let Some(material) = &self.data {
            lines.push(format!(
                "{}: {} chunk(s)",
                truncate(&material.filename, 50),
                material.chunk_count
            ));
        }
        if let Some(error) = &self.error {
            lines.push(format!("{} {error}", console::style("Error:").red()));
        }
        lines.join("\n")
    }
}

fn describe(view: &TrackerView<Material>) -> String {
    match view.phase {
        JobPhase::Triggered => "Uploading material for embedding".to_string(),
        _ => "Chunking and embedding".to_string(),
    }
}

pub async fn embed(args: EmbedArgs, ctx: &CommandContext) -> Result<()> {
    let mut surface = ctx.surface()?;
    let spinner = ctx.spinner(format!("Embedding {}", args.material_id));
    let view = surface.embed_material(&args.material_id);
    let settled = follow(view, &spinner, describe).await?;
    surface.teardown();

    let result = TrackerOutput::from_view(&args.material_id, settled, MaterialDetail::from);
    let error = result.error.clone();
    report(&spinner, &result, result.succeeded(), error.as_deref(), ctx.json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_output_human() {
        let out = TrackerOutput {
            entity_id: "m1".to_string(),
            phase: JobPhase::Succeeded,
            job_id: None,
            error: None,
            data: Some(MaterialDetail {
                id: "m1".to_string(),
                filename: "hoofdstuk-3.pdf".to_string(),
                chunk_count: 12,
            }),
        };
        assert!(out.succeeded());
        assert!(out.to_human().contains("hoofdstuk-3.pdf: 12 chunk(s)"));
    }
}

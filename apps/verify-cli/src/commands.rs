//! One function per subcommand

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context as _};
use shared_types::{ArtifactKind, VerificationId};
use verify_client::{ApiClient, FilePayload};
use verify_core::imaging::sniff_mime;
use verify_core::{
    comparisons, Catalog, ClientConfig, CropRegion, DocumentPipeline, FileManager, FrameBuffer,
    LoadOutcome, LopdfBackend, RenderOutcome, SubmissionEngine, SubmitOutcome,
};

use crate::output;

pub struct Context {
    pub client: Arc<ApiClient>,
    pub config: ClientConfig,
}

impl Context {
    fn file_manager(&self) -> Arc<FileManager> {
        Arc::new(FileManager::with_min_percent(self.config.crop.min_percent))
    }

    async fn refreshed_catalog(&self) -> anyhow::Result<Catalog> {
        let mut catalog = Catalog::new();
        catalog.replace(self.client.list_verifications().await?);
        Ok(catalog)
    }
}

pub async fn login(ctx: &Context, username: &str, password: &str) -> anyhow::Result<()> {
    ctx.client.login(username, password).await?;
    println!("Logged in as {}", username);
    if let Some(token) = ctx.client.session().token() {
        println!("export VERIFY_TOKEN={}", token);
    }
    Ok(())
}

pub async fn whoami(ctx: &Context) -> anyhow::Result<()> {
    let user = ctx.client.current_user().await?;
    println!("{}", user.username);
    Ok(())
}

pub async fn list(ctx: &Context, search: Option<&str>) -> anyhow::Result<()> {
    let catalog = ctx.refreshed_catalog().await?;
    let entries = match search {
        Some(query) => catalog.search(query),
        None => catalog.entries().iter().collect(),
    };
    output::print_catalog(&entries, catalog.selected());
    Ok(())
}

pub async fn create(ctx: &Context, name: &str) -> anyhow::Result<()> {
    ctx.client.create_verification(name).await?;
    let catalog = ctx.refreshed_catalog().await?;
    output::print_catalog(&catalog.search(name), catalog.selected());
    Ok(())
}

pub async fn rename(ctx: &Context, id: &VerificationId, name: &str) -> anyhow::Result<()> {
    ctx.client.rename_verification(id, name).await?;
    println!("Renamed {} to {}", id, name);
    Ok(())
}

pub async fn delete(ctx: &Context, id: &VerificationId) -> anyhow::Result<()> {
    ctx.client.delete_verification(id).await?;
    println!("Deleted {}", id);
    Ok(())
}

pub async fn show(ctx: &Context, id: &VerificationId) -> anyhow::Result<()> {
    let verification = ctx.client.get_verification(id).await?;
    output::print_verification(&verification);
    output::print_comparisons(&comparisons(&verification));
    Ok(())
}

pub async fn convert(ctx: &Context, docx: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let payload = read_payload(docx, document_mime(docx)).await?;
    let files = ctx.file_manager();
    let pipeline = DocumentPipeline::new(Arc::new(LopdfBackend), ctx.client.clone(), files.clone())
        .with_scale(ctx.config.render.scale);

    let info = match pipeline.convert(payload).await? {
        LoadOutcome::Committed(info) => info,
        LoadOutcome::Stale => bail!("conversion was superseded"),
    };
    println!("{}: {} page(s)", docx.display(), info.page_count);

    let surface = FrameBuffer::new();
    for page in 1..=info.page_count {
        if let RenderOutcome::Rendered(viewport) = pipeline.render_page(page, &surface).await? {
            println!(
                "  page {}: {:.0}x{:.0} at scale {} -> {}x{} px",
                page,
                viewport.width / viewport.scale,
                viewport.height / viewport.scale,
                viewport.scale,
                viewport.pixel_width(),
                viewport.pixel_height()
            );
        }
    }

    if let Some(out) = out {
        let pdf = files
            .snapshot()
            .pdf
            .file
            .context("converted PDF was not stored")?;
        tokio::fs::write(out, &pdf.bytes[..])
            .await
            .with_context(|| format!("writing {}", out.display()))?;
        println!("Wrote {}", out.display());
    }
    Ok(())
}

pub struct SubmitInputs {
    pub docx: Option<PathBuf>,
    pub image: Option<PathBuf>,
    pub region: Option<CropRegion>,
}

pub async fn submit(
    ctx: &Context,
    id: &VerificationId,
    inputs: SubmitInputs,
) -> anyhow::Result<()> {
    let files = ctx.file_manager();
    files.select(Some(id.clone()));

    if inputs.docx.is_none() || inputs.image.is_none() {
        if let LoadOutcome::Stale = files.load_existing(ctx.client.as_ref(), id).await? {
            bail!("verification {} changed while loading", id);
        }
    }

    if let Some(path) = &inputs.docx {
        let payload = read_payload(path, document_mime(path)).await?;
        files.set_document(payload, None, ArtifactKind::Docx)?;
    }
    if let Some(path) = &inputs.image {
        let bytes = read_bytes(path).await?;
        let payload = FilePayload::new(file_name(path), sniff_mime(&bytes), bytes);
        files.import_image(payload, None).await?;
    }
    if let Some(region) = inputs.region {
        files.set_image_region(region)?;
    }

    let engine = SubmissionEngine::new(ctx.client.clone());
    let SubmitOutcome::Completed { id, scope, detail } =
        engine.submit(files.active().as_ref(), &files.snapshot()).await?;
    println!("Verification {} completed (scope {})", id, scope);

    if let Some(detail) = detail {
        output::print_comparisons(&comparisons(&detail));
    }

    let mut catalog = ctx.refreshed_catalog().await?;
    if catalog.selected() != Some(&id) {
        catalog.toggle(&id);
    }
    output::print_catalog(&catalog.entries().iter().collect::<Vec<_>>(), catalog.selected());
    Ok(())
}

async fn read_bytes(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn read_payload(path: &Path, mime_type: &str) -> anyhow::Result<FilePayload> {
    let bytes = read_bytes(path).await?;
    Ok(FilePayload::new(file_name(path), mime_type, bytes))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn document_mime(path: &Path) -> &'static str {
    let is_docx = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("docx"));
    if is_docx {
        ArtifactKind::Docx.default_mime_type()
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_document_mime() {
        assert_eq!(
            document_mime(Path::new("a/Label.DOCX")),
            ArtifactKind::Docx.default_mime_type()
        );
        assert_eq!(document_mime(Path::new("label.pdf")), "application/octet-stream");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(Path::new("/tmp/photo.jpg")), "photo.jpg");
        assert_eq!(file_name(Path::new("/")), "");
    }
}

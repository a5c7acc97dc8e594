//! Artifact slots for the active verification
//!
//! Three typed slots (source document, rendered PDF, image) plus the crop
//! region attached to the image. All mutations take one short lock, so a
//! reader never observes a file without its name or an image without its
//! region.
//!
//! Loading existing artifacts is asynchronous. Every load carries a
//! [`LoadTicket`] with the selection epoch and per-slot revisions it was
//! issued under. A result that comes back after the selection changed is
//! dropped, and a slot replaced or cleared meanwhile is left alone.

use parking_lot::Mutex;
use shared_types::{ArtifactKind, Verification, VerificationId};
use verify_client::{FilePayload, VerificationApi};

use crate::crop::{self, CropRegion, ImageSize};
use crate::error::FileError;
use crate::imaging;

/// Natural and displayed size of the loaded image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageGeometry {
    pub natural: ImageSize,
    pub display: ImageSize,
}

impl ImageGeometry {
    /// Geometry of an image shown at its natural size
    pub fn natural(size: ImageSize) -> Self {
        Self {
            natural: size,
            display: size,
        }
    }
}

/// One artifact slot
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSlot {
    pub kind: ArtifactKind,
    pub file: Option<FilePayload>,
    pub file_name: String,
    /// Selection on the image; the zero rectangle for other slots
    pub region: CropRegion,
    /// Known once the image header has been decoded
    pub geometry: Option<ImageGeometry>,
}

impl ArtifactSlot {
    pub fn empty(kind: ArtifactKind) -> Self {
        Self {
            kind,
            file: None,
            file_name: String::new(),
            region: CropRegion::ZERO,
            geometry: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.file.is_some()
    }
}

/// Consistent copy of all slots, tagged with the selection it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSet {
    pub verification: Option<VerificationId>,
    pub epoch: u64,
    pub docx: ArtifactSlot,
    pub pdf: ArtifactSlot,
    pub image: ArtifactSlot,
    /// Bumped whenever a slot's file is replaced or cleared
    revisions: [u64; 3],
}

impl ArtifactSet {
    fn empty(verification: Option<VerificationId>, epoch: u64) -> Self {
        Self {
            verification,
            epoch,
            docx: ArtifactSlot::empty(ArtifactKind::Docx),
            pdf: ArtifactSlot::empty(ArtifactKind::Pdf),
            image: ArtifactSlot::empty(ArtifactKind::Image),
            revisions: [0; 3],
        }
    }

    pub fn slot(&self, kind: ArtifactKind) -> &ArtifactSlot {
        match kind {
            ArtifactKind::Docx => &self.docx,
            ArtifactKind::Pdf => &self.pdf,
            ArtifactKind::Image => &self.image,
        }
    }

    fn slot_mut(&mut self, kind: ArtifactKind) -> &mut ArtifactSlot {
        match kind {
            ArtifactKind::Docx => &mut self.docx,
            ArtifactKind::Pdf => &mut self.pdf,
            ArtifactKind::Image => &mut self.image,
        }
    }

    /// Replace a slot and invalidate loads issued before the change
    fn replace(&mut self, slot: ArtifactSlot) {
        let kind = slot.kind;
        self.revisions[slot_index(kind)] += 1;
        *self.slot_mut(kind) = slot;
    }

    fn ticket(&self) -> LoadTicket {
        LoadTicket {
            epoch: self.epoch,
            revisions: self.revisions,
        }
    }
}

fn slot_index(kind: ArtifactKind) -> usize {
    match kind {
        ArtifactKind::Docx => 0,
        ArtifactKind::Pdf => 1,
        ArtifactKind::Image => 2,
    }
}

/// Selection epoch and slot revisions an asynchronous load was issued under.
///
/// A load may only write a slot that nobody replaced or cleared since the
/// ticket was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    epoch: u64,
    revisions: [u64; 3],
}

impl LoadTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn admits(&self, state: &ArtifactSet, kind: ArtifactKind) -> bool {
        let index = slot_index(kind);
        state.epoch == self.epoch && state.revisions[index] == self.revisions[index]
    }
}

/// Result of an asynchronous load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome<T> {
    /// The result was stored
    Committed(T),
    /// The selection or the target slot changed while loading; nothing was stored
    Stale,
}

impl<T> LoadOutcome<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self, LoadOutcome::Stale)
    }
}

pub struct FileManager {
    state: Mutex<ArtifactSet>,
    min_percent: f64,
}

impl FileManager {
    pub fn new() -> Self {
        Self::with_min_percent(crop::MIN_PERCENT)
    }

    pub fn with_min_percent(min_percent: f64) -> Self {
        Self {
            state: Mutex::new(ArtifactSet::empty(None, 0)),
            min_percent,
        }
    }

    pub fn active(&self) -> Option<VerificationId> {
        self.state.lock().verification.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Tag for a load that will commit later
    pub fn ticket(&self) -> LoadTicket {
        self.state.lock().ticket()
    }

    pub fn snapshot(&self) -> ArtifactSet {
        self.state.lock().clone()
    }

    /// Switch the active verification. All slots are cleared before this
    /// returns, and any load still in flight becomes stale.
    pub fn select(&self, verification: Option<VerificationId>) -> u64 {
        let mut state = self.state.lock();
        let epoch = state.epoch + 1;
        tracing::debug!(
            "Active verification {:?} -> {:?} (epoch {})",
            state.verification,
            verification,
            epoch
        );
        *state = ArtifactSet::empty(verification, epoch);
        epoch
    }

    /// Store a document-type artifact. The name falls back to the payload's
    /// own name, then to the slot default.
    pub fn set_document(
        &self,
        file: FilePayload,
        name: Option<&str>,
        kind: ArtifactKind,
    ) -> Result<(), FileError> {
        if kind == ArtifactKind::Image {
            return Err(FileError::NotADocument(kind));
        }
        let file_name = resolve_name(name, &file, kind);
        tracing::debug!("Set {} slot: {} ({} bytes)", kind, file_name, file.len());

        self.state.lock().replace(ArtifactSlot {
            file: Some(file),
            file_name,
            ..ArtifactSlot::empty(kind)
        });
        Ok(())
    }

    /// Store the DOCX and its converted PDF together, but only if neither
    /// slot changed since `ticket` was taken
    pub fn commit_documents(&self, ticket: LoadTicket, docx: FilePayload, pdf: FilePayload) -> bool {
        let mut state = self.state.lock();
        if !(ticket.admits(&state, ArtifactKind::Docx) && ticket.admits(&state, ArtifactKind::Pdf)) {
            tracing::debug!(
                "Dropping converted document for epoch {} (now {})",
                ticket.epoch,
                state.epoch
            );
            return false;
        }
        state.replace(ArtifactSlot {
            file_name: resolve_name(None, &docx, ArtifactKind::Docx),
            file: Some(docx),
            ..ArtifactSlot::empty(ArtifactKind::Docx)
        });
        state.replace(ArtifactSlot {
            file_name: resolve_name(None, &pdf, ArtifactKind::Pdf),
            file: Some(pdf),
            ..ArtifactSlot::empty(ArtifactKind::Pdf)
        });
        true
    }

    /// Store an image. The natural size is read from the header right away;
    /// without an explicit region the default one is used. Returns the
    /// region actually stored.
    pub fn set_image(
        &self,
        file: FilePayload,
        name: Option<&str>,
        region: Option<CropRegion>,
    ) -> CropRegion {
        let geometry = match imaging::read_dimensions(&file.bytes) {
            Ok(size) => Some(ImageGeometry::natural(size)),
            Err(e) => {
                tracing::warn!("Could not read dimensions of {}: {}", file.name, e);
                None
            }
        };
        let region = region.unwrap_or_else(|| default_region(geometry));
        let region = crop::clamp_with_min(region, self.min_percent);
        let file_name = resolve_name(name, &file, ArtifactKind::Image);
        tracing::debug!(
            "Set image slot: {} ({} bytes), region {:?}",
            file_name,
            file.len(),
            region
        );

        self.state.lock().replace(ArtifactSlot {
            kind: ArtifactKind::Image,
            file: Some(file),
            file_name,
            region,
            geometry,
        });
        region
    }

    /// Decode the image header off the event loop, then store the image with
    /// its geometry and a default region
    pub async fn import_image(
        &self,
        file: FilePayload,
        name: Option<&str>,
    ) -> Result<LoadOutcome<CropRegion>, FileError> {
        let ticket = self.ticket();
        let geometry = match imaging::decode_dimensions(file.bytes.clone()).await {
            Ok(size) => Some(ImageGeometry::natural(size)),
            Err(e) => {
                tracing::warn!("Could not read dimensions of {}: {}", file.name, e);
                None
            }
        };
        let slot = ArtifactSlot {
            kind: ArtifactKind::Image,
            file_name: resolve_name(name, &file, ArtifactKind::Image),
            file: Some(file),
            region: crop::clamp_with_min(default_region(geometry), self.min_percent),
            geometry,
        };

        let mut state = self.state.lock();
        if !ticket.admits(&state, ArtifactKind::Image) {
            tracing::debug!("Dropping imported image {}, slot changed", slot.file_name);
            return Ok(LoadOutcome::Stale);
        }
        let region = slot.region;
        state.replace(slot);
        Ok(LoadOutcome::Committed(region))
    }

    /// Replace the selection on the loaded image. The minimum-size rule is
    /// applied here, on every update.
    pub fn set_image_region(&self, region: CropRegion) -> Result<CropRegion, FileError> {
        let mut state = self.state.lock();
        if !state.image.is_loaded() {
            return Err(FileError::NoImage);
        }
        let region = crop::clamp_with_min(region, self.min_percent);
        state.image.region = region;
        tracing::debug!("Image region updated: {:?}", region);
        Ok(region)
    }

    /// Record the size the image is displayed at. The natural size always
    /// comes from the image header, never from the display size.
    pub fn set_image_display_size(&self, display: ImageSize) -> Result<(), FileError> {
        let mut state = self.state.lock();
        let natural = match (&state.image.file, state.image.geometry) {
            (None, _) => return Err(FileError::NoImage),
            (Some(_), Some(geometry)) => geometry.natural,
            (Some(file), None) => imaging::read_dimensions(&file.bytes)?,
        };
        state.image.geometry = Some(ImageGeometry { natural, display });
        Ok(())
    }

    /// Empty one slot. A load still in flight for it will not write it.
    pub fn clear(&self, kind: ArtifactKind) {
        tracing::debug!("Clear {} slot", kind);
        self.state.lock().replace(ArtifactSlot::empty(kind));
    }

    /// Empty every slot, regions included
    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        for kind in ArtifactKind::ALL {
            state.replace(ArtifactSlot::empty(kind));
        }
        tracing::debug!("Cleared all slots");
    }

    /// Release everything and detach from any verification
    pub fn teardown(&self) {
        self.select(None);
    }

    /// Fetch a verification and every artifact it reports, then store them
    /// all at once.
    ///
    /// A failed detail fetch fails the load. A failed artifact download
    /// leaves that slot empty. If the active verification changed meanwhile,
    /// nothing is stored and [`LoadOutcome::Stale`] is returned; a slot that
    /// was replaced or cleared meanwhile keeps its new content.
    pub async fn load_existing(
        &self,
        api: &dyn VerificationApi,
        id: &VerificationId,
    ) -> Result<LoadOutcome<Verification>, FileError> {
        let ticket = self.ticket();
        let detail = api.fetch_verification(id).await?;

        let (docx, pdf, image) = tokio::join!(
            fetch_slot(api, &detail, ArtifactKind::Docx),
            fetch_slot(api, &detail, ArtifactKind::Pdf),
            fetch_slot(api, &detail, ArtifactKind::Image),
        );
        let image = match image {
            Some(slot) => Some(self.prepare_image(slot, &detail).await),
            None => None,
        };

        let mut state = self.state.lock();
        if state.epoch != ticket.epoch || state.verification.as_ref() != Some(id) {
            tracing::debug!(
                "Discarding artifacts of verification {} (epoch {} -> {})",
                id,
                ticket.epoch,
                state.epoch
            );
            return Ok(LoadOutcome::Stale);
        }

        let mut committed = 0;
        for (kind, slot) in [
            (ArtifactKind::Docx, docx),
            (ArtifactKind::Pdf, pdf),
            (ArtifactKind::Image, image),
        ] {
            if !ticket.admits(&state, kind) {
                tracing::debug!("{} slot changed during load of {}, keeping it", kind, id);
                continue;
            }
            state.replace(slot.unwrap_or_else(|| ArtifactSlot::empty(kind)));
            committed += 1;
        }
        if committed == 0 {
            return Ok(LoadOutcome::Stale);
        }

        tracing::info!(
            "Loaded verification {}: docx={} pdf={} image={}",
            id,
            state.docx.is_loaded(),
            state.pdf.is_loaded(),
            state.image.is_loaded()
        );
        Ok(LoadOutcome::Committed(detail))
    }

    /// Attach geometry and a region to a downloaded image
    async fn prepare_image(&self, mut slot: ArtifactSlot, detail: &Verification) -> ArtifactSlot {
        let natural = match &slot.file {
            Some(file) => match imaging::decode_dimensions(file.bytes.clone()).await {
                Ok(size) => Some(size),
                Err(e) => {
                    tracing::warn!("Could not read dimensions of {}: {}", slot.file_name, e);
                    None
                }
            },
            None => None,
        };

        let persisted = detail
            .artifact_info(ArtifactKind::Image)
            .and_then(|info| info.ocr_scope.as_deref())
            .filter(|scope| !scope.trim().is_empty())
            .and_then(|scope| crop::deserialize(scope, natural));

        let geometry = natural.map(ImageGeometry::natural);
        let region = persisted.unwrap_or_else(|| default_region(geometry));
        slot.region = crop::clamp_with_min(region, self.min_percent);
        slot.geometry = geometry;
        slot
    }
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new()
    }
}

fn default_region(geometry: Option<ImageGeometry>) -> CropRegion {
    match geometry {
        Some(g) => crop::initial_region(g.natural),
        None => CropRegion::centered(),
    }
}

fn resolve_name(name: Option<&str>, file: &FilePayload, kind: ArtifactKind) -> String {
    name.filter(|n| !n.is_empty())
        .or_else(|| Some(file.name.as_str()).filter(|n| !n.is_empty()))
        .unwrap_or(kind.default_file_name())
        .to_string()
}

/// Download one artifact if the detail record says it exists
async fn fetch_slot(
    api: &dyn VerificationApi,
    detail: &Verification,
    kind: ArtifactKind,
) -> Option<ArtifactSlot> {
    if !detail.has_artifact(kind) {
        return None;
    }

    let bytes = match api.fetch_artifact(&detail.id, kind).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                "Failed to download {} of verification {}: {}",
                kind,
                detail.id,
                e
            );
            return None;
        }
    };

    let file_name = detail
        .artifact_info(kind)
        .and_then(|info| info.filename.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| kind.default_file_name().to_string());
    let mime_type = match kind {
        ArtifactKind::Image => imaging::sniff_mime(&bytes),
        _ => kind.default_mime_type(),
    };

    Some(ArtifactSlot {
        kind,
        file: Some(FilePayload::new(file_name.clone(), mime_type, bytes)),
        file_name,
        region: CropRegion::ZERO,
        geometry: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::fixtures;
    use pretty_assertions::assert_eq;

    fn docx() -> FilePayload {
        FilePayload::new(
            "label.docx",
            ArtifactKind::Docx.default_mime_type(),
            b"PK".to_vec(),
        )
    }

    fn image() -> FilePayload {
        FilePayload::new("photo.png", "image/png", fixtures::png(40, 20))
    }

    #[test]
    fn test_set_document_replaces_name() {
        let manager = FileManager::new();
        manager
            .set_document(docx(), Some("first.docx"), ArtifactKind::Docx)
            .unwrap();
        manager.set_document(docx(), None, ArtifactKind::Docx).unwrap();

        let snap = manager.snapshot();
        assert_eq!(snap.docx.file_name, "label.docx");
        assert!(snap.docx.is_loaded());
        assert!(!snap.pdf.is_loaded());
    }

    #[test]
    fn test_set_document_default_name() {
        let manager = FileManager::new();
        let pdf = FilePayload::new("", "application/pdf", b"%PDF".to_vec());
        manager.set_document(pdf, None, ArtifactKind::Pdf).unwrap();
        assert_eq!(manager.snapshot().pdf.file_name, "document.pdf");
    }

    #[test]
    fn test_image_is_not_a_document() {
        let manager = FileManager::new();
        let err = manager
            .set_document(image(), None, ArtifactKind::Image)
            .unwrap_err();
        assert!(matches!(err, FileError::NotADocument(ArtifactKind::Image)));
    }

    #[test]
    fn test_set_image_defaults_and_clamps_region() {
        let manager = FileManager::new();
        let region = manager.set_image(image(), None, None);
        assert_eq!(region, CropRegion::centered());

        let region = manager.set_image(image(), None, Some(CropRegion::new(95.0, 0.0, 1.0, 50.0)));
        assert_eq!(region, CropRegion::new(90.0, 0.0, 10.0, 50.0));
        assert_eq!(manager.snapshot().image.region, region);
    }

    #[test]
    fn test_region_requires_image() {
        let manager = FileManager::new();
        assert!(matches!(
            manager.set_image_region(CropRegion::centered()),
            Err(FileError::NoImage)
        ));
        assert!(matches!(
            manager.set_image_display_size(ImageSize::new(10, 10)),
            Err(FileError::NoImage)
        ));
    }

    #[test]
    fn test_region_update_is_clamped() {
        let manager = FileManager::new();
        manager.set_image(image(), None, None);
        let region = manager
            .set_image_region(CropRegion::new(50.0, 50.0, 3.0, 80.0))
            .unwrap();
        assert_eq!(region, CropRegion::new(50.0, 20.0, 10.0, 80.0));
    }

    #[test]
    fn test_clear_all_resets_regions() {
        let manager = FileManager::new();
        manager.set_document(docx(), None, ArtifactKind::Docx).unwrap();
        manager.set_image(image(), None, None);
        manager.clear_all();

        let snap = manager.snapshot();
        for kind in ArtifactKind::ALL {
            assert_eq!(snap.slot(kind), &ArtifactSlot::empty(kind));
        }
    }

    #[test]
    fn test_clear_single_slot() {
        let manager = FileManager::new();
        manager.set_document(docx(), None, ArtifactKind::Docx).unwrap();
        manager.set_image(image(), None, None);
        manager.clear(ArtifactKind::Image);

        let snap = manager.snapshot();
        assert!(snap.docx.is_loaded());
        assert_eq!(snap.image.region, CropRegion::ZERO);
    }

    #[test]
    fn test_select_clears_and_bumps_epoch() {
        let manager = FileManager::new();
        manager.set_image(image(), None, None);
        let epoch = manager.select(Some(VerificationId::from(4)));
        assert_eq!(epoch, 1);
        assert_eq!(manager.active(), Some(VerificationId::from(4)));
        assert!(!manager.snapshot().image.is_loaded());

        manager.teardown();
        assert_eq!(manager.active(), None);
        assert_eq!(manager.epoch(), 2);
    }

    #[test]
    fn test_commit_documents_checks_ticket() {
        let manager = FileManager::new();
        manager.select(Some(VerificationId::from(1)));
        let ticket = manager.ticket();
        let pdf = FilePayload::new("document.pdf", "application/pdf", b"%PDF".to_vec());

        manager.select(Some(VerificationId::from(2)));
        assert!(!manager.commit_documents(ticket, docx(), pdf.clone()));
        assert!(!manager.snapshot().docx.is_loaded());

        assert!(manager.commit_documents(manager.ticket(), docx(), pdf));
        let snap = manager.snapshot();
        assert_eq!(snap.docx.file_name, "label.docx");
        assert_eq!(snap.pdf.file_name, "document.pdf");
    }

    #[test]
    fn test_clear_invalidates_ticket() {
        let manager = FileManager::new();
        manager.select(Some(VerificationId::from(1)));
        let pdf = FilePayload::new("document.pdf", "application/pdf", b"%PDF".to_vec());

        let ticket = manager.ticket();
        manager.clear(ArtifactKind::Pdf);
        assert!(!manager.commit_documents(ticket, docx(), pdf.clone()));

        let ticket = manager.ticket();
        manager.clear_all();
        assert!(!manager.commit_documents(ticket, docx(), pdf));
        assert!(!manager.snapshot().docx.is_loaded());
        assert_eq!(manager.epoch(), ticket.epoch());
    }

    #[test]
    fn test_set_image_reads_natural_size() {
        let manager = FileManager::new();
        manager.set_image(image(), None, None);
        assert_eq!(
            manager.snapshot().image.geometry,
            Some(ImageGeometry::natural(ImageSize::new(40, 20)))
        );
    }

    #[test]
    fn test_display_size_keeps_natural() {
        let manager = FileManager::new();
        manager.set_image(image(), None, None);
        manager
            .set_image_display_size(ImageSize::new(20, 10))
            .unwrap();
        let geometry = manager.snapshot().image.geometry.unwrap();
        assert_eq!(geometry.display, ImageSize::new(20, 10));
        assert_eq!(geometry.natural, ImageSize::new(40, 20));
    }

    #[test]
    fn test_display_size_of_unreadable_image() {
        let manager = FileManager::new();
        let junk = FilePayload::new("photo.bin", "image/*", b"not an image".to_vec());
        manager.set_image(junk, None, None);
        assert_eq!(manager.snapshot().image.geometry, None);

        let err = manager
            .set_image_display_size(ImageSize::new(500, 400))
            .unwrap_err();
        assert!(matches!(err, FileError::Image(_)), "{:?}", err);
        assert_eq!(manager.snapshot().image.geometry, None);
    }

    #[tokio::test]
    async fn test_import_image_after_clear_is_kept() {
        let manager = FileManager::new();
        manager.clear(ArtifactKind::Image);
        let outcome = manager.import_image(image(), None).await.unwrap();
        assert!(!outcome.is_stale());
        assert!(manager.snapshot().image.is_loaded());
    }

    #[tokio::test]
    async fn test_import_image_reads_geometry() {
        let manager = FileManager::new();
        let outcome = manager.import_image(image(), None).await.unwrap();
        assert_eq!(outcome, LoadOutcome::Committed(CropRegion::centered()));

        manager
            .set_image_display_size(ImageSize::new(400, 200))
            .unwrap();
        let geometry = manager.snapshot().image.geometry.unwrap();
        assert_eq!(geometry.natural, ImageSize::new(40, 20));
        assert_eq!(geometry.display, ImageSize::new(400, 200));
    }
}

pub mod cascade;
pub mod config;
pub mod fetch;
pub mod orchestrator;
pub mod postprocess;
pub mod prompt;
pub mod providers;
pub mod publish;
pub mod storage;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use lookbook_contracts::angles::{ALL_ANGLES, DEFAULT_ANGLE};
use lookbook_contracts::api::{
    AngleOption, CapabilitiesBody, CropRequestBody, CropResponseBody, GenerateRequestBody,
    GenerateResponseBody,
};
use lookbook_contracts::error::{ErrorPayload, StudioError};
use lookbook_contracts::generation::{sha256_hex, ImageBlob};
use lookbook_contracts::models::{CandidateList, ModelSelector};
use lookbook_contracts::profiles::ProfileCatalog;
use lookbook_contracts::runs::gallery_store::GalleryStore;
use lookbook_contracts::runs::ledger::{GenerationRecord, LedgerWriter};
use tracing::{info, warn};

use crate::config::{EngineConfig, StorageConfig};
use crate::fetch::{HttpImageFetcher, ImageFetcher};
use crate::orchestrator::{BatchInputs, Orchestrator};
use crate::postprocess::process_crop;
use crate::providers::{DryrunModel, GeminiClient, ImageModel};
use crate::publish::{apply_to_gallery, crop_object_key, LedgerSink};
use crate::storage::{HttpObjectStore, LocalObjectStore, ObjectStore};

/// External collaborators, built once and shared by every request.
#[derive(Clone)]
pub struct StudioServices {
    pub model: Arc<dyn ImageModel>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub objects: Option<Arc<dyn ObjectStore>>,
}

impl StudioServices {
    pub fn from_config(config: &EngineConfig) -> Self {
        let model: Arc<dyn ImageModel> = if config.dryrun {
            Arc::new(DryrunModel::default())
        } else {
            Arc::new(GeminiClient::new(config))
        };
        let objects: Option<Arc<dyn ObjectStore>> = match &config.storage {
            StorageConfig::Unconfigured => None,
            StorageConfig::Local {
                root,
                public_base_url,
            } => Some(Arc::new(LocalObjectStore::new(
                root.clone(),
                public_base_url.clone(),
            ))),
            StorageConfig::Http {
                endpoint,
                token,
                public_base_url,
            } => Some(Arc::new(HttpObjectStore::new(
                endpoint,
                token.clone(),
                public_base_url,
            ))),
        };
        Self {
            model,
            fetcher: Arc::new(HttpImageFetcher::new(config)),
            objects,
        }
    }
}

pub struct StudioEngine {
    config: EngineConfig,
    services: StudioServices,
    selector: ModelSelector,
    profiles: ProfileCatalog,
    ledger: LedgerWriter,
    galleries: GalleryStore,
}

impl StudioEngine {
    pub fn new(config: EngineConfig, services: StudioServices) -> Self {
        let ledger = LedgerWriter::new(config.ledger_path());
        let galleries = GalleryStore::new(config.gallery_path());
        Self {
            config,
            services,
            selector: ModelSelector::new(None),
            profiles: ProfileCatalog::default(),
            ledger,
            galleries,
        }
    }

    pub fn from_config(config: EngineConfig) -> Self {
        let services = StudioServices::from_config(&config);
        Self::new(config, services)
    }

    pub fn galleries(&self) -> &GalleryStore {
        &self.galleries
    }

    pub fn candidates(&self) -> CandidateList {
        self.selector
            .cascade(self.services.model.provider(), &self.config.image_models)
    }

    pub fn capabilities(&self) -> CapabilitiesBody {
        CapabilitiesBody {
            profiles: self.profiles.list().to_vec(),
            angles: ALL_ANGLES
                .iter()
                .map(|angle| AngleOption {
                    id: angle.token().to_string(),
                    label: angle.label().to_string(),
                })
                .collect(),
            default_angle: DEFAULT_ANGLE.token().to_string(),
            model_configured: self.config.model_configured(),
            background_removal_configured: self.config.background_removal_key.is_some(),
            models: self.candidates().as_slice().to_vec(),
        }
    }

    /// Runs one multi-angle batch for `product_id` and rewrites its gallery.
    pub fn generate(
        &self,
        product_id: &str,
        requested_by: Option<&str>,
        body: GenerateRequestBody,
    ) -> Result<GenerateResponseBody, StudioError> {
        let product_id = product_id.trim();
        if product_id.is_empty() {
            return Err(StudioError::validation("product id is required"));
        }
        let request = body.into_request()?;
        self.require_model()?;
        let objects = self.require_objects()?;

        let sources = request
            .source_image_urls
            .iter()
            .map(|url| self.fetch_blob(url))
            .collect::<Result<Vec<_>, _>>()?;
        let color_reference = request
            .color_reference_image_url
            .as_deref()
            .map(|url| self.fetch_blob(url))
            .transpose()?;

        let candidates = self.candidates();
        info!(
            product_id,
            angles = request.angles.len(),
            sources = sources.len(),
            candidates = candidates.len(),
            "generation batch started"
        );

        let mut sink = LedgerSink {
            objects,
            ledger: &self.ledger,
            product_id,
            requested_by,
            source_hashes: sources
                .iter()
                .map(|blob| blob.content_hash.clone())
                .collect(),
            color_reference_hash: color_reference
                .as_ref()
                .map(|blob| blob.content_hash.clone()),
        };
        let orchestrator =
            Orchestrator::new(self.services.model.as_ref(), &candidates, &self.profiles);
        let outcome = orchestrator
            .run(
                BatchInputs {
                    request: &request,
                    sources: &sources,
                    color_reference: color_reference.as_ref(),
                },
                &mut sink,
            )
            .inspect_err(|err| {
                warn!(
                    product_id,
                    status = err.status(),
                    code = err.code().as_str(),
                    "generation batch failed"
                );
            })?;

        let gallery = apply_to_gallery(
            &self.galleries,
            product_id,
            &outcome,
            request.merge_options(),
        )?;
        info!(
            product_id,
            generated = outcome.successes.len(),
            failed = outcome.failures.len(),
            profile = outcome.profile.id.as_str(),
            "generation batch finished"
        );
        Ok(GenerateResponseBody::from_outcome(&outcome, gallery.images))
    }

    pub fn crop(&self, body: CropRequestBody) -> Result<CropResponseBody, StudioError> {
        let spec = body.into_spec()?;
        let objects = self.require_objects()?;
        let fetched = self.services.fetcher.fetch(&spec.image_url)?;
        let output = process_crop(&fetched.bytes, &spec)?;
        let stored = objects
            .put(&crop_object_key(&sha256_hex(&output.bytes)), &output.bytes, &output.mime_type)
            .map_err(StudioError::storage)?;
        info!(
            source = spec.image_url.as_str(),
            url = stored.url.as_str(),
            width = output.width,
            height = output.height,
            "crop stored"
        );
        Ok(CropResponseBody {
            cropped_image_url: stored.url,
            mime_type: output.mime_type,
            width: output.width,
            height: output.height,
            crop: output.extract,
            aspect: spec.aspect.to_string(),
        })
    }

    pub fn history(&self, product_id: &str) -> Result<Vec<GenerationRecord>, StudioError> {
        self.ledger
            .records_for(product_id.trim())
            .map_err(StudioError::storage)
    }

    /// Debug details are only exposed outside production.
    pub fn error_payload(&self, err: &StudioError) -> ErrorPayload {
        err.to_payload(!self.config.production)
    }

    fn require_model(&self) -> Result<(), StudioError> {
        if self.services.model.provider() == "gemini" && self.config.gemini_api_key.is_none() {
            return Err(StudioError::configuration(
                "GEMINI_API_KEY or GOOGLE_API_KEY must be set (or LOOKBOOK_DRYRUN=1)",
            ));
        }
        Ok(())
    }

    fn require_objects(&self) -> Result<&dyn ObjectStore, StudioError> {
        self.services.objects.as_deref().ok_or_else(|| {
            StudioError::configuration(
                "object storage is not configured; set LOOKBOOK_STORAGE_DIR or \
                 LOOKBOOK_STORAGE_ENDPOINT with LOOKBOOK_PUBLIC_BASE_URL",
            )
        })
    }

    fn fetch_blob(&self, url: &str) -> Result<ImageBlob, StudioError> {
        Ok(self.services.fetcher.fetch(url)?.into_blob())
    }
}

use lookbook_contracts::angles::{Angle, DEFAULT_ANGLE};
use lookbook_contracts::error::{AngleFailure, RetryCause, StudioError};
use lookbook_contracts::generation::{
    AngleResult, AngleSuccess, BatchOutcome, ConsistencyAnchor, GeneratedAngle, GenerationRequest,
    ImageBlob,
};
use lookbook_contracts::models::CandidateList;
use lookbook_contracts::profiles::{ProfileCatalog, StyleProfile};
use tracing::{info, warn};

use crate::cascade::run_cascade;
use crate::prompt::{compose_prompt, PromptInputs};
use crate::providers::{ImageModel, PromptPayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedImage {
    pub url: String,
    pub record_id: String,
}

/// Receives each successful angle before the next angle is generated.
pub trait ResultSink {
    fn persist(&mut self, generated: &GeneratedAngle) -> Result<PersistedImage, StudioError>;
}

/// Fetched inputs shared by every angle of one batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchInputs<'a> {
    pub request: &'a GenerationRequest,
    pub sources: &'a [ImageBlob],
    pub color_reference: Option<&'a ImageBlob>,
}

#[derive(Debug, Default)]
struct BatchState {
    anchor: Option<ConsistencyAnchor>,
    profile: Option<StyleProfile>,
    results: Vec<AngleResult>,
    last_cause: Option<RetryCause>,
}

pub struct Orchestrator<'a> {
    model: &'a dyn ImageModel,
    candidates: &'a CandidateList,
    profiles: &'a ProfileCatalog,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        model: &'a dyn ImageModel,
        candidates: &'a CandidateList,
        profiles: &'a ProfileCatalog,
    ) -> Self {
        Self {
            model,
            candidates,
            profiles,
        }
    }

    /// Angles run strictly in request order. Per-angle upstream failures are
    /// recorded and the batch continues; configuration and sink errors abort it.
    pub fn run(
        &self,
        inputs: BatchInputs<'_>,
        sink: &mut dyn ResultSink,
    ) -> Result<BatchOutcome, StudioError> {
        let angles: Vec<Angle> = if inputs.request.angles.is_empty() {
            vec![DEFAULT_ANGLE]
        } else {
            inputs.request.angles.clone()
        };

        let state = angles
            .iter()
            .enumerate()
            .try_fold(BatchState::default(), |state, (index, angle)| {
                self.step(state, index, *angle, inputs, sink)
            })?;

        let BatchState {
            profile,
            results,
            last_cause,
            ..
        } = state;
        let profile = match profile {
            Some(profile) => profile,
            None => self.initial_profile(inputs.request)?,
        };
        let outcome = BatchOutcome::from_results(results, profile);
        if outcome.successes.is_empty() {
            return Err(StudioError::BatchFailed {
                failures: outcome.failures,
                last_cause,
            });
        }
        Ok(outcome)
    }

    fn step(
        &self,
        mut state: BatchState,
        index: usize,
        angle: Angle,
        inputs: BatchInputs<'_>,
        sink: &mut dyn ResultSink,
    ) -> Result<BatchState, StudioError> {
        let profile = match &state.profile {
            Some(locked) => locked.clone(),
            None => self.initial_profile(inputs.request)?,
        };
        let prompt = compose_prompt(&PromptInputs {
            profile: &profile,
            angle,
            source_count: inputs.sources.len(),
            target_color: inputs.request.target_color.as_deref(),
            has_color_reference: inputs.color_reference.is_some(),
            anchor_angle: state.anchor.as_ref().map(|anchor| anchor.angle),
            custom_prompt: inputs.request.custom_prompt.as_deref(),
        });
        let payload = PromptPayload {
            text: prompt.clone(),
            images: reference_images(inputs, state.anchor.as_ref()),
        };

        match run_cascade(self.model, self.candidates, &payload) {
            Ok(success) => {
                let generated = GeneratedAngle {
                    angle,
                    image: ImageBlob::new(success.image.bytes, success.image.mime_type),
                    model_used: success.model_used,
                    profile: profile.clone(),
                    prompt,
                    revised_prompt: success.revised_prompt,
                    anchor_url: state.anchor.as_ref().map(|anchor| anchor.url.clone()),
                    anchor_hash: state
                        .anchor
                        .as_ref()
                        .map(|anchor| anchor.content_hash().to_string()),
                };
                let persisted = sink.persist(&generated)?;
                info!(
                    angle = angle.token(),
                    index,
                    model = generated.model_used.as_str(),
                    profile = profile.id.as_str(),
                    url = persisted.url.as_str(),
                    "angle generated"
                );

                if state.anchor.is_none() {
                    state.anchor = Some(ConsistencyAnchor {
                        angle,
                        url: persisted.url.clone(),
                        image: generated.image.clone(),
                    });
                    state.profile = Some(profile);
                }
                state.results.push(AngleResult::Success(Box::new(AngleSuccess {
                    generated,
                    url: persisted.url,
                    record_id: persisted.record_id,
                })));
            }
            Err(err @ StudioError::Configuration(_)) => return Err(err),
            Err(err) => {
                warn!(
                    angle = angle.token(),
                    index,
                    status = err.status(),
                    code = err.code().as_str(),
                    "angle failed; continuing batch"
                );
                if let Some(cause) = err.retry_cause() {
                    state.last_cause = Some(cause);
                }
                state.results.push(AngleResult::Failure(AngleFailure {
                    angle,
                    message: err.to_string(),
                    status: err.status(),
                    code: err.code(),
                }));
            }
        }
        Ok(state)
    }

    fn initial_profile(&self, request: &GenerationRequest) -> Result<StyleProfile, StudioError> {
        self.profiles
            .resolve(request.preferred_profile_id.as_deref())
            .cloned()
            .ok_or_else(|| StudioError::configuration("no style profiles configured"))
    }
}

fn reference_images(inputs: BatchInputs<'_>, anchor: Option<&ConsistencyAnchor>) -> Vec<ImageBlob> {
    inputs
        .sources
        .iter()
        .chain(inputs.color_reference)
        .chain(anchor.map(|anchor| &anchor.image))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use lookbook_contracts::angles::Angle;
    use lookbook_contracts::error::{StudioError, UpstreamFailure};
    use lookbook_contracts::generation::{GeneratedAngle, GenerationRequest, ImageBlob};
    use lookbook_contracts::models::CandidateList;
    use lookbook_contracts::profiles::ProfileCatalog;

    use super::{BatchInputs, Orchestrator, PersistedImage, ResultSink};
    use crate::testing::{failure, image_output, png_bytes, ScriptedModel};

    #[derive(Default)]
    struct RecordingSink {
        persisted: Vec<GeneratedAngle>,
        fail_on: Option<Angle>,
    }

    impl ResultSink for RecordingSink {
        fn persist(&mut self, generated: &GeneratedAngle) -> Result<PersistedImage, StudioError> {
            if self.fail_on == Some(generated.angle) {
                return Err(StudioError::storage("disk full"));
            }
            self.persisted.push(generated.clone());
            let n = self.persisted.len();
            Ok(PersistedImage {
                url: format!("https://cdn.test/{}-{n}.png", generated.angle),
                record_id: format!("rec-{n}"),
            })
        }
    }

    fn request(angles: &[Angle]) -> GenerationRequest {
        GenerationRequest {
            source_image_urls: vec!["https://shop.test/a.jpg".to_string()],
            color_reference_image_url: None,
            custom_prompt: None,
            target_color: None,
            angles: angles.to_vec(),
            preferred_profile_id: Some("soft_shadow".to_string()),
            place_first: true,
            max_images: None,
        }
    }

    fn sources() -> Vec<ImageBlob> {
        vec![ImageBlob::new(png_bytes(4, 4, 9), "image/png")]
    }

    #[test]
    fn quota_fallback_keeps_profile_and_anchor_on_first_success() -> anyhow::Result<()> {
        let model = ScriptedModel::new(vec![
            Ok(image_output(10, None)),
            Err(failure(429, "RESOURCE_EXHAUSTED", "quota exceeded")),
            Ok(image_output(11, Some("back view"))),
        ]);
        let candidates = CandidateList::new(["m1", "m2"]);
        let profiles = ProfileCatalog::default();
        let request = request(&[Angle::Front, Angle::Back]);
        let sources = sources();
        let mut sink = RecordingSink::default();

        let outcome = Orchestrator::new(&model, &candidates, &profiles).run(
            BatchInputs {
                request: &request,
                sources: &sources,
                color_reference: None,
            },
            &mut sink,
        )?;

        assert!(!outcome.partial_success());
        assert_eq!(outcome.generated_angles(), vec![Angle::Front, Angle::Back]);
        assert_eq!(outcome.profile.id, "soft_shadow");
        assert_eq!(model.models_called(), vec!["m1", "m1", "m2"]);

        let front = &outcome.successes[0];
        let back = &outcome.successes[1];
        assert_eq!(back.generated.profile, front.generated.profile);
        assert_eq!(back.generated.model_used, "m2");
        assert_eq!(back.generated.anchor_url.as_deref(), Some(front.url.as_str()));
        assert_eq!(
            back.generated.anchor_hash.as_deref(),
            Some(front.generated.image.content_hash.as_str())
        );
        assert_eq!(back.generated.revised_prompt.as_deref(), Some("back view"));

        let calls = model.calls();
        assert_eq!(calls[0].image_hashes, vec![sources[0].content_hash.clone()]);
        assert_eq!(
            calls[2].image_hashes,
            vec![
                sources[0].content_hash.clone(),
                front.generated.image.content_hash.clone()
            ]
        );
        assert!(calls[2].text.contains("already-approved front view"));
        assert_eq!(sink.persisted.len(), 2);
        Ok(())
    }

    #[test]
    fn anchor_stays_on_first_success_for_later_angles() -> anyhow::Result<()> {
        let model = ScriptedModel::default();
        let candidates = CandidateList::new(["m1"]);
        let profiles = ProfileCatalog::default();
        let request = request(&[Angle::Front, Angle::Side, Angle::Back]);
        let sources = sources();
        let mut sink = RecordingSink::default();

        let outcome = Orchestrator::new(&model, &candidates, &profiles).run(
            BatchInputs {
                request: &request,
                sources: &sources,
                color_reference: None,
            },
            &mut sink,
        )?;
        let first_url = outcome.successes[0].url.clone();
        for later in &outcome.successes[1..] {
            assert_eq!(later.generated.anchor_url.as_deref(), Some(first_url.as_str()));
            assert_eq!(later.generated.profile, outcome.profile);
        }
        Ok(())
    }

    #[test]
    fn failed_angle_is_recorded_and_batch_continues() -> anyhow::Result<()> {
        let model = ScriptedModel::new(vec![
            Err(failure(400, "INVALID_ARGUMENT", "image rejected by policy")),
            Ok(image_output(2, None)),
        ]);
        let candidates = CandidateList::new(["m1", "m2"]);
        let profiles = ProfileCatalog::default();
        let request = request(&[Angle::Front, Angle::Back]);
        let sources = sources();
        let color = ImageBlob::new(png_bytes(2, 2, 77), "image/png");
        let mut sink = RecordingSink::default();

        let outcome = Orchestrator::new(&model, &candidates, &profiles).run(
            BatchInputs {
                request: &request,
                sources: &sources,
                color_reference: Some(&color),
            },
            &mut sink,
        )?;

        assert!(outcome.partial_success());
        assert_eq!(outcome.generated_angles(), vec![Angle::Back]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].angle, Angle::Front);
        assert_eq!(outcome.failures[0].status, 400);
        assert_eq!(outcome.failures[0].code, "INVALID_ARGUMENT");
        // back becomes the anchor-less first success
        assert!(outcome.successes[0].generated.anchor_url.is_none());
        let calls = model.calls();
        assert_eq!(
            calls[1].image_hashes,
            vec![sources[0].content_hash.clone(), color.content_hash.clone()]
        );
        Ok(())
    }

    #[test]
    fn all_angles_failing_is_a_batch_failure() {
        let quota = || Err(failure(429, "RESOURCE_EXHAUSTED", "quota"));
        let model = ScriptedModel::new(vec![quota(), quota()]);
        let candidates = CandidateList::new(["m1"]);
        let profiles = ProfileCatalog::default();
        let request = request(&[Angle::Front, Angle::Back]);
        let sources = sources();
        let mut sink = RecordingSink::default();

        let err = Orchestrator::new(&model, &candidates, &profiles)
            .run(
                BatchInputs {
                    request: &request,
                    sources: &sources,
                    color_reference: None,
                },
                &mut sink,
            )
            .err();
        let Some(err) = err else {
            panic!("expected batch failure");
        };
        assert_eq!(err.status(), 429);
        assert_eq!(err.code(), "GENERATION_FAILED");
        match err {
            StudioError::BatchFailed { failures, .. } => {
                let angles: Vec<Angle> = failures.iter().map(|row| row.angle).collect();
                assert_eq!(angles, vec![Angle::Front, Angle::Back]);
                assert!(failures.iter().all(|row| row.status == 429));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(sink.persisted.is_empty());
    }

    #[test]
    fn non_quota_total_failure_is_502() {
        let model = ScriptedModel::new(vec![
            Err(failure(503, "UNAVAILABLE", "busy")),
            Err(UpstreamFailure::new(Some(400), Some("INVALID_ARGUMENT"), "bad")),
        ]);
        let candidates = CandidateList::new(["m1"]);
        let profiles = ProfileCatalog::default();
        let request = request(&[Angle::Front, Angle::Back]);
        let sources = sources();
        let mut sink = RecordingSink::default();

        let err = Orchestrator::new(&model, &candidates, &profiles)
            .run(
                BatchInputs {
                    request: &request,
                    sources: &sources,
                    color_reference: None,
                },
                &mut sink,
            )
            .err();
        assert_eq!(err.map(|err| err.status()), Some(502));
    }

    #[test]
    fn quota_absorbed_before_a_fatal_failure_sets_batch_status() {
        let model = ScriptedModel::new(vec![
            Err(failure(429, "RESOURCE_EXHAUSTED", "quota")),
            Err(failure(503, "UNAVAILABLE", "busy")),
            Err(failure(429, "RESOURCE_EXHAUSTED", "quota")),
            Err(failure(400, "INVALID_ARGUMENT", "policy")),
        ]);
        let candidates = CandidateList::new(["m1", "m2"]);
        let profiles = ProfileCatalog::default();
        let request = request(&[Angle::Front, Angle::Back]);
        let sources = sources();
        let mut sink = RecordingSink::default();

        let err = Orchestrator::new(&model, &candidates, &profiles)
            .run(
                BatchInputs {
                    request: &request,
                    sources: &sources,
                    color_reference: None,
                },
                &mut sink,
            )
            .err();
        let Some(err) = err else {
            panic!("expected batch failure");
        };
        assert_eq!(err.status(), 429);
        match err {
            StudioError::BatchFailed { failures, .. } => {
                assert_eq!(failures[0].status, 502);
                assert_eq!(failures[1].status, 400);
                assert!(failures[1].message.contains("after m1: quota (429 RESOURCE_EXHAUSTED)"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sink_failure_aborts_the_batch() {
        let model = ScriptedModel::default();
        let candidates = CandidateList::new(["m1"]);
        let profiles = ProfileCatalog::default();
        let request = request(&[Angle::Front, Angle::Back]);
        let sources = sources();
        let mut sink = RecordingSink {
            fail_on: Some(Angle::Back),
            ..RecordingSink::default()
        };

        let err = Orchestrator::new(&model, &candidates, &profiles)
            .run(
                BatchInputs {
                    request: &request,
                    sources: &sources,
                    color_reference: None,
                },
                &mut sink,
            )
            .err();
        assert!(matches!(err, Some(StudioError::Storage(_))));
        assert_eq!(sink.persisted.len(), 1);
    }
}

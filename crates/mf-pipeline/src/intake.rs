//! Intake accumulator: stages incoming files toward the selected job kind.
//!
//! [`evaluate`] is the pure decision over the job kind's [`InputPolicy`];
//! [`IntakeAccumulator`] wraps it with the session store so accepted files
//! are durably staged before the caller hears back.

use std::sync::Arc;

use dashmap::DashMap;
use mf_core::{
    classify, FileKind, IncomingFile, InputPolicy, JobSpec, PreconditionError, SessionStore,
    StagedInput, UserId,
};
use parking_lot::Mutex;

/// Result of evaluating one incoming file against the staged ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ready,
    NeedMore { missing: Vec<String> },
}

/// What the caller should do after a file was accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// The file is staged; the job still lacks `missing`.
    NeedMore {
        staged: StagedInput,
        missing: Vec<String>,
    },
    /// Every requirement is met. `inputs` holds all staged files in arrival
    /// order, the new one last.
    Ready {
        spec: JobSpec,
        inputs: Vec<StagedInput>,
    },
}

/// Decide whether `incoming` may be staged next to `staged` and whether that
/// completes the job's inputs.
///
/// Rejections never consume a slot: a file of a kind the policy does not use
/// is [`PreconditionError::WrongInputKind`], and a file for a role that is
/// already filled is [`PreconditionError::DuplicateRole`].
pub fn evaluate(
    policy: &InputPolicy,
    staged: &[FileKind],
    incoming: FileKind,
) -> Result<Verdict, PreconditionError> {
    if !policy.accepts(incoming) {
        return Err(PreconditionError::WrongInputKind {
            kind: incoming,
            expected: policy.accepted_kinds(),
        });
    }

    match policy {
        InputPolicy::Count { kind, count } => {
            let already = staged.iter().filter(|k| *k == kind).count();
            if already >= *count {
                return Err(PreconditionError::DuplicateRole {
                    role: kind.to_string(),
                    missing: Vec::new(),
                });
            }
            let have = already + 1;
            if have >= *count {
                Ok(Verdict::Ready)
            } else {
                Ok(Verdict::NeedMore {
                    missing: vec![format!("{} more {kind}", count - have)],
                })
            }
        }
        InputPolicy::Roles(roles) => {
            // Fill roles from the staged kinds, first matching role wins.
            let mut pool: Vec<FileKind> = staged.to_vec();
            let mut filled: Vec<bool> = roles
                .iter()
                .map(|role| match pool.iter().position(|k| *k == role.kind) {
                    Some(idx) => {
                        pool.swap_remove(idx);
                        true
                    }
                    None => false,
                })
                .collect();

            let unmet = |filled: &[bool]| -> Vec<String> {
                roles
                    .iter()
                    .zip(filled)
                    .filter(|(_, f)| !**f)
                    .map(|(r, _)| r.name.to_string())
                    .collect()
            };

            let slot = roles
                .iter()
                .zip(filled.iter())
                .position(|(role, f)| role.kind == incoming && !*f);

            let Some(slot) = slot else {
                let role = roles
                    .iter()
                    .find(|r| r.kind == incoming)
                    .map(|r| r.name.to_string())
                    .unwrap_or_else(|| incoming.to_string());
                return Err(PreconditionError::DuplicateRole {
                    role,
                    missing: unmet(&filled),
                });
            };
            filled[slot] = true;

            let missing = unmet(&filled);
            if missing.is_empty() {
                Ok(Verdict::Ready)
            } else {
                Ok(Verdict::NeedMore { missing })
            }
        }
        InputPolicy::Single(_) => Ok(Verdict::Ready),
    }
}

/// Per-user staging on top of a [`SessionStore`].
pub struct IntakeAccumulator {
    sessions: Arc<dyn SessionStore>,
    /// Zero disables the size check.
    max_file_size: u64,
    /// Held across read, decide and append of one user's file.
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl IntakeAccumulator {
    pub fn new(sessions: Arc<dyn SessionStore>, max_file_size: u64) -> Self {
        Self {
            sessions,
            max_file_size,
            locks: DashMap::new(),
        }
    }

    /// Classify and stage `file` for `user`.
    ///
    /// Precondition failures leave the session untouched. Files for the
    /// same user are decided one at a time, so concurrent arrivals never
    /// judge against a stale staging list.
    pub fn receive(&self, user: UserId, file: &IncomingFile) -> mf_core::Result<IntakeOutcome> {
        let lock = self.locks.entry(user).or_default().clone();
        let _guard = lock.lock();

        let session = self.sessions.load_session(user)?;
        let kind = session.job_kind.ok_or(PreconditionError::NoJobSelected)?;
        let spec = JobSpec::resolve(kind, session.job_config.as_ref())?;

        if self.max_file_size > 0 && file.size > self.max_file_size {
            return Err(PreconditionError::FileTooLarge {
                size: file.size,
                limit: self.max_file_size,
            }
            .into());
        }

        let file_kind = classify(&file.name);
        let mut staged = self.sessions.staged_inputs(user)?;
        let kinds: Vec<FileKind> = staged.iter().map(|s| s.kind).collect();
        let verdict = evaluate(&kind.descriptor().inputs, &kinds, file_kind)?;

        let input = self.sessions.append_staged_input(user, file, file_kind)?;
        tracing::debug!(
            user_id = %user,
            job_kind = %kind,
            file_kind = %file_kind,
            name = %file.name,
            "input staged"
        );

        match verdict {
            Verdict::Ready => {
                staged.push(input);
                Ok(IntakeOutcome::Ready {
                    spec,
                    inputs: staged,
                })
            }
            Verdict::NeedMore { missing } => Ok(IntakeOutcome::NeedMore {
                staged: input,
                missing,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::job::{EncodeConfig, JobConfig};
    use mf_core::{ChatId, EncodePreset, InputSource, JobKind, MergeVariant};

    fn roles_policy(kind: JobKind) -> InputPolicy {
        kind.descriptor().inputs
    }

    fn file(name: &str, size: u64) -> IncomingFile {
        IncomingFile {
            name: name.into(),
            size,
            source: InputSource::Endpoint {
                chat_id: ChatId(-100),
                message_id: 1,
                file_ref: format!("ref-{name}"),
            },
        }
    }

    fn accumulator() -> (IntakeAccumulator, Arc<mf_db::SqliteStore>) {
        let pool = mf_db::init_memory_pool().unwrap();
        let store = Arc::new(mf_db::SqliteStore::new(pool));
        (IntakeAccumulator::new(store.clone(), 1_000_000), store)
    }

    // -- evaluate -------------------------------------------------------------

    #[test]
    fn count_policy_is_ready_on_the_last_file_only() {
        let policy = roles_policy(JobKind::Merge(MergeVariant::VideoVideo));
        assert_eq!(
            evaluate(&policy, &[], FileKind::Video).unwrap(),
            Verdict::NeedMore {
                missing: vec!["1 more video".into()]
            }
        );
        assert_eq!(
            evaluate(&policy, &[FileKind::Video], FileKind::Video).unwrap(),
            Verdict::Ready
        );
    }

    #[test]
    fn roles_are_order_independent() {
        let policy = roles_policy(JobKind::Merge(MergeVariant::VideoAudio));

        let first = evaluate(&policy, &[], FileKind::Audio).unwrap();
        assert_eq!(
            first,
            Verdict::NeedMore {
                missing: vec!["video".into()]
            }
        );
        assert_eq!(
            evaluate(&policy, &[FileKind::Audio], FileKind::Video).unwrap(),
            Verdict::Ready
        );
    }

    #[test]
    fn filled_role_is_rejected_with_what_is_missing() {
        let policy = roles_policy(JobKind::Watermark);
        let err = evaluate(&policy, &[FileKind::Video], FileKind::Video).unwrap_err();
        assert_eq!(
            err,
            PreconditionError::DuplicateRole {
                role: "video".into(),
                missing: vec!["watermark image".into()],
            }
        );
    }

    #[test]
    fn unusable_kind_is_rejected() {
        let policy = roles_policy(JobKind::Encode);
        let err = evaluate(&policy, &[], FileKind::Subtitle).unwrap_err();
        assert!(matches!(
            err,
            PreconditionError::WrongInputKind { kind: FileKind::Subtitle, .. }
        ));

        let err = evaluate(&policy, &[], FileKind::Unknown).unwrap_err();
        assert!(matches!(err, PreconditionError::WrongInputKind { .. }));
    }

    #[test]
    fn single_policy_is_ready_immediately() {
        let policy = roles_policy(JobKind::MediaInfo);
        assert_eq!(evaluate(&policy, &[], FileKind::Audio).unwrap(), Verdict::Ready);
    }

    // -- accumulator ----------------------------------------------------------

    #[test]
    fn no_job_selected_is_a_precondition_failure() {
        let (intake, store) = accumulator();
        let err = intake.receive(UserId(1), &file("a.mp4", 10)).unwrap_err();
        assert!(matches!(
            err,
            mf_core::Error::Precondition(PreconditionError::NoJobSelected)
        ));
        assert!(store.staged_inputs(UserId(1)).unwrap().is_empty());
    }

    #[test]
    fn encode_without_preset_is_rejected_and_not_staged() {
        let (intake, store) = accumulator();
        let user = UserId(2);
        store.select_job(user, JobKind::Encode, None).unwrap();

        let err = intake.receive(user, &file("a.mp4", 10)).unwrap_err();
        assert!(matches!(
            err,
            mf_core::Error::Precondition(PreconditionError::ConfigureFirst {
                kind: JobKind::Encode
            })
        ));
        assert!(store.staged_inputs(user).unwrap().is_empty());
    }

    #[test]
    fn encode_with_preset_is_ready() {
        let (intake, store) = accumulator();
        let user = UserId(3);
        let preset = EncodePreset {
            name: "720p".into(),
            width: 1280,
            height: 720,
            crf: 23,
            video_bitrate: "2500k".into(),
            audio_bitrate: "128k".into(),
            speed: "medium".into(),
            codec: "libx264".into(),
        };
        store
            .select_job(
                user,
                JobKind::Encode,
                Some(JobConfig::Encode(EncodeConfig { preset })),
            )
            .unwrap();

        match intake.receive(user, &file("a.mkv", 10)).unwrap() {
            IntakeOutcome::Ready { spec, inputs } => {
                assert_eq!(spec.kind(), JobKind::Encode);
                assert_eq!(inputs.len(), 1);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn merge_needs_two_videos() {
        let (intake, store) = accumulator();
        let user = UserId(4);
        store
            .select_job(user, JobKind::Merge(MergeVariant::VideoVideo), None)
            .unwrap();

        let first = intake.receive(user, &file("a.mp4", 10)).unwrap();
        assert!(matches!(first, IntakeOutcome::NeedMore { .. }));

        match intake.receive(user, &file("b.mp4", 10)).unwrap() {
            IntakeOutcome::Ready { inputs, .. } => {
                let names: Vec<&str> = inputs.iter().map(|i| i.name.as_str()).collect();
                assert_eq!(names, vec!["a.mp4", "b.mp4"]);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn rejected_files_do_not_take_a_slot() {
        let (intake, store) = accumulator();
        let user = UserId(5);
        store.select_job(user, JobKind::Watermark, None).unwrap();

        assert!(intake.receive(user, &file("notes.srt", 10)).is_err());
        assert!(intake.receive(user, &file("a.mp4", 10)).is_ok());
        assert!(intake.receive(user, &file("b.mp4", 10)).is_err());
        assert_eq!(store.staged_inputs(user).unwrap().len(), 1);

        let outcome = intake.receive(user, &file("logo.png", 10)).unwrap();
        assert!(matches!(outcome, IntakeOutcome::Ready { .. }));
    }

    #[test]
    fn count_policy_rejects_files_beyond_the_count() {
        let policy = roles_policy(JobKind::Merge(MergeVariant::VideoVideo));
        let err = evaluate(&policy, &[FileKind::Video, FileKind::Video], FileKind::Video)
            .unwrap_err();
        assert_eq!(
            err,
            PreconditionError::DuplicateRole {
                role: "video".into(),
                missing: vec![],
            }
        );
    }

    /// Store whose staging reads are slow enough for concurrent arrivals to
    /// overlap.
    struct SlowStaging(Arc<mf_db::SqliteStore>);

    impl SessionStore for SlowStaging {
        fn load_session(&self, user: UserId) -> mf_core::Result<mf_core::Session> {
            self.0.load_session(user)
        }
        fn select_job(
            &self,
            user: UserId,
            kind: JobKind,
            config: Option<JobConfig>,
        ) -> mf_core::Result<()> {
            self.0.select_job(user, kind, config)
        }
        fn reset_job(&self, user: UserId) -> mf_core::Result<()> {
            self.0.reset_job(user)
        }
        fn update_preferences(
            &self,
            user: UserId,
            prefs: &mf_core::Preferences,
        ) -> mf_core::Result<()> {
            self.0.update_preferences(user, prefs)
        }
        fn set_banned(&self, user: UserId, banned: bool) -> mf_core::Result<()> {
            self.0.set_banned(user, banned)
        }
        fn staged_inputs(&self, user: UserId) -> mf_core::Result<Vec<StagedInput>> {
            let staged = self.0.staged_inputs(user);
            std::thread::sleep(std::time::Duration::from_millis(50));
            staged
        }
        fn append_staged_input(
            &self,
            user: UserId,
            file: &IncomingFile,
            kind: FileKind,
        ) -> mf_core::Result<StagedInput> {
            self.0.append_staged_input(user, file, kind)
        }
        fn clear_staged_inputs(&self, user: UserId) -> mf_core::Result<usize> {
            self.0.clear_staged_inputs(user)
        }
    }

    fn receive_concurrently(
        kind: JobKind,
        names: [&'static str; 2],
    ) -> (Vec<mf_core::Result<IntakeOutcome>>, Arc<mf_db::SqliteStore>) {
        let store = Arc::new(mf_db::SqliteStore::new(mf_db::init_memory_pool().unwrap()));
        let user = UserId(7);
        store.select_job(user, kind, None).unwrap();
        let intake = Arc::new(IntakeAccumulator::new(
            Arc::new(SlowStaging(store.clone())),
            0,
        ));

        let handles: Vec<_> = names
            .into_iter()
            .map(|name| {
                let intake = intake.clone();
                std::thread::spawn(move || intake.receive(user, &file(name, 10)))
            })
            .collect();
        let results = handles.into_iter().map(|h| h.join().unwrap()).collect();
        (results, store)
    }

    #[test]
    fn concurrent_arrivals_report_ready_exactly_once() {
        let (results, store) =
            receive_concurrently(JobKind::Merge(MergeVariant::VideoVideo), ["a.mp4", "b.mp4"]);

        let ready = results
            .iter()
            .filter(|r| matches!(r, Ok(IntakeOutcome::Ready { .. })))
            .count();
        let need_more = results
            .iter()
            .filter(|r| matches!(r, Ok(IntakeOutcome::NeedMore { .. })))
            .count();
        assert_eq!((ready, need_more), (1, 1));
        assert_eq!(store.staged_inputs(UserId(7)).unwrap().len(), 2);
    }

    #[test]
    fn concurrent_arrivals_cannot_fill_a_role_twice() {
        let (results, store) = receive_concurrently(JobKind::Watermark, ["a.mp4", "b.mp4"]);

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(mf_core::Error::Precondition(PreconditionError::DuplicateRole { .. }))
        )));
        assert_eq!(store.staged_inputs(UserId(7)).unwrap().len(), 1);
    }

    #[test]
    fn oversized_files_are_rejected() {
        let (intake, store) = accumulator();
        let user = UserId(6);
        store.select_job(user, JobKind::Convert, None).unwrap();

        let err = intake.receive(user, &file("big.mp4", 2_000_000)).unwrap_err();
        assert!(matches!(
            err,
            mf_core::Error::Precondition(PreconditionError::FileTooLarge { .. })
        ));
        assert!(store.staged_inputs(user).unwrap().is_empty());
    }
}

//! Session state for the track builder front end.
//!
//! A [`Session`] is the single source of truth for what the user has picked:
//! the two source files, their trim windows, and whether a build is running.
//! Setters store whatever they are given; validation happens when a build
//! starts.

use crate::audio::engine::Engine;
use crate::track::{
    BuildError, BuildOutcome, BuildStatus, DownloadSink, Part, SourceFile, TimeInterval,
    TrackBuilder,
};
use thiserror::Error;

/// Errors raised when building from a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A source file has not been chosen yet.
    #[error("no {0} file selected")]
    MissingFile(Part),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Everything the user has selected.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSelection {
    pub active_file: Option<SourceFile>,
    pub rest_file: Option<SourceFile>,
    pub active_interval: TimeInterval,
    pub rest_interval: TimeInterval,
    pub is_processing: bool,
}

impl Default for SourceSelection {
    fn default() -> Self {
        Self {
            active_file: None,
            rest_file: None,
            active_interval: TimeInterval::default_active(),
            rest_interval: TimeInterval::default_rest(),
            is_processing: false,
        }
    }
}

/// Holds the current [`SourceSelection`].
#[derive(Debug, Default)]
pub struct Session {
    selection: SourceSelection,
    /// Status of the builder this session drives, if attached.
    status: Option<BuildStatus>,
}

impl Session {
    /// Creates a session with no files and the default intervals.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active_file(&mut self, file: SourceFile) {
        self.selection.active_file = Some(file);
    }

    pub fn set_rest_file(&mut self, file: SourceFile) {
        self.selection.rest_file = Some(file);
    }

    pub fn set_active_interval(&mut self, interval: TimeInterval) {
        self.selection.active_interval = interval;
    }

    pub fn set_rest_interval(&mut self, interval: TimeInterval) {
        self.selection.rest_interval = interval;
    }

    /// Records whether the front end considers a build to be running.
    ///
    /// This flag is advisory. It does not block builds.
    pub fn set_running(&mut self, running: bool) {
        self.selection.is_processing = running;
    }

    /// Restores the initial state: no files, default intervals, not running.
    ///
    /// A build already in progress is not cancelled.
    pub fn reset(&mut self) {
        self.selection = SourceSelection::default();
    }

    /// Ties [`Session::is_processing`] to a builder's real status.
    pub fn attach_status(&mut self, status: BuildStatus) {
        self.status = Some(status);
    }

    pub fn active_file(&self) -> Option<&SourceFile> {
        self.selection.active_file.as_ref()
    }

    pub fn rest_file(&self) -> Option<&SourceFile> {
        self.selection.rest_file.as_ref()
    }

    pub fn active_interval(&self) -> TimeInterval {
        self.selection.active_interval
    }

    pub fn rest_interval(&self) -> TimeInterval {
        self.selection.rest_interval
    }

    /// True if the running flag is set or the attached builder is busy.
    pub fn is_processing(&self) -> bool {
        self.selection.is_processing || self.status.as_ref().is_some_and(BuildStatus::is_busy)
    }

    /// The stored selection, exactly as set.
    pub fn selection(&self) -> &SourceSelection {
        &self.selection
    }

    /// Builds a track from the current selection.
    ///
    /// # Errors
    ///
    /// Returns error if either file is missing or the build fails.
    pub fn build<E: Engine>(
        &self,
        builder: &TrackBuilder<E>,
        sink: &mut dyn DownloadSink,
    ) -> Result<BuildOutcome, SessionError> {
        let active = self
            .active_file()
            .ok_or(SessionError::MissingFile(Part::Active))?;
        let rest = self
            .rest_file()
            .ok_or(SessionError::MissingFile(Part::Rest))?;
        let outcome = builder.build_track(
            active,
            rest,
            self.active_interval(),
            self.rest_interval(),
            sink,
        )?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::engine::fake::FakeEngine;
    use crate::track::{BuildConfig, Download};

    fn file(name: &str) -> SourceFile {
        SourceFile::new(name, name.as_bytes().to_vec())
    }

    fn populated() -> Session {
        let mut session = Session::new();
        session.set_active_file(file("burpees.mp3"));
        session.set_rest_file(file("breathe.mp3"));
        session.set_active_interval(TimeInterval::new(3.0, 23.5));
        session.set_rest_interval(TimeInterval::new(1.0, 11.0));
        session.set_running(true);
        session
    }

    #[test]
    fn test_initial_state() {
        let session = Session::new();
        assert_eq!(session.selection(), &SourceSelection::default());
        assert_eq!(session.active_interval(), TimeInterval::new(0.0, 20.0));
        assert_eq!(session.rest_interval(), TimeInterval::new(0.0, 10.0));
        assert!(session.active_file().is_none());
        assert!(session.rest_file().is_none());
        assert!(!session.is_processing());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut session = populated();
        assert_ne!(session.selection(), &SourceSelection::default());

        session.reset();
        let expected = SourceSelection {
            active_file: None,
            rest_file: None,
            active_interval: TimeInterval::new(0.0, 20.0),
            rest_interval: TimeInterval::new(0.0, 10.0),
            is_processing: false,
        };
        assert_eq!(session.selection(), &expected);

        // Resetting twice changes nothing
        session.reset();
        assert_eq!(session.selection(), &expected);
    }

    #[test]
    fn test_each_setter_touches_one_field() {
        let base = populated();

        let mut s = populated();
        s.set_active_file(file("sprint.mp3"));
        assert_eq!(
            s.selection(),
            &SourceSelection {
                active_file: Some(file("sprint.mp3")),
                ..base.selection().clone()
            }
        );

        let mut s = populated();
        s.set_rest_file(file("walk.mp3"));
        assert_eq!(
            s.selection(),
            &SourceSelection {
                rest_file: Some(file("walk.mp3")),
                ..base.selection().clone()
            }
        );

        let mut s = populated();
        s.set_active_interval(TimeInterval::new(0.0, 45.0));
        assert_eq!(
            s.selection(),
            &SourceSelection {
                active_interval: TimeInterval::new(0.0, 45.0),
                ..base.selection().clone()
            }
        );

        let mut s = populated();
        s.set_rest_interval(TimeInterval::new(5.0, 20.0));
        assert_eq!(
            s.selection(),
            &SourceSelection {
                rest_interval: TimeInterval::new(5.0, 20.0),
                ..base.selection().clone()
            }
        );

        let mut s = populated();
        s.set_running(false);
        assert_eq!(
            s.selection(),
            &SourceSelection {
                is_processing: false,
                ..base.selection().clone()
            }
        );
    }

    #[test]
    fn test_setters_accept_unvalidated_intervals() {
        let mut session = Session::new();
        session.set_active_interval(TimeInterval::new(30.0, 10.0));
        assert_eq!(session.active_interval(), TimeInterval::new(30.0, 10.0));
    }

    #[test]
    fn test_running_flag_is_advisory() {
        let builder = TrackBuilder::new(FakeEngine::new(), BuildConfig::default());
        let mut session = Session::new();
        session.attach_status(builder.status());
        assert!(!session.is_processing());

        session.set_running(true);
        assert!(session.is_processing());
        session.reset();
        assert!(!session.is_processing());
    }

    #[test]
    fn test_is_processing_while_build_in_flight() {
        /// Records what the session reports at delivery time.
        struct Observe<'a> {
            session: &'a Session,
            seen: Vec<bool>,
        }

        impl DownloadSink for Observe<'_> {
            fn deliver(&mut self, _download: Download) -> std::io::Result<()> {
                self.seen.push(self.session.is_processing());
                Ok(())
            }
        }

        let config = BuildConfig {
            check_bounds: false,
            ..BuildConfig::default()
        };
        let builder = TrackBuilder::new(FakeEngine::new(), config);
        let mut session = Session::new();
        session.attach_status(builder.status());
        session.set_active_file(file("a.mp3"));
        session.set_rest_file(file("r.mp3"));

        // The advisory flag stays off, so only the builder status can report busy
        let mut sink = Observe {
            session: &session,
            seen: Vec::new(),
        };
        session.build(&builder, &mut sink).unwrap();
        assert_eq!(sink.seen, [true]);

        assert!(!builder.status().is_busy());
        assert!(!session.is_processing());
    }

    #[test]
    fn test_build_requires_both_files() {
        let builder = TrackBuilder::new(FakeEngine::new(), BuildConfig::default());
        let mut sink: Vec<Download> = Vec::new();
        let mut session = Session::new();

        let err = session.build(&builder, &mut sink).unwrap_err();
        assert!(matches!(err, SessionError::MissingFile(Part::Active)));

        session.set_active_file(file("a.mp3"));
        let err = session.build(&builder, &mut sink).unwrap_err();
        assert!(matches!(err, SessionError::MissingFile(Part::Rest)));
        assert_eq!(err.to_string(), "no rest file selected");
    }

    #[test]
    fn test_build_uses_current_selection() {
        let config = BuildConfig {
            check_bounds: false,
            repetitions: 2,
            ..BuildConfig::default()
        };
        let builder = TrackBuilder::new(FakeEngine::new(), config);
        let mut sink: Vec<Download> = Vec::new();

        let mut session = Session::new();
        session.set_active_file(SourceFile::new("a.mp3", b"A".to_vec()));
        session.set_rest_file(SourceFile::new("r.mp3", b"R".to_vec()));
        session.build(&builder, &mut sink).unwrap();
        assert_eq!(sink[0].bytes, b"ARAR");

        session.set_rest_interval(TimeInterval::new(4.0, 4.0));
        let err = session.build(&builder, &mut sink).unwrap_err();
        assert!(matches!(err, SessionError::Build(BuildError::Validation { .. })));
        assert_eq!(sink.len(), 1);
    }
}

//! Progress arithmetic shared by the tracker and its tests.

/// Learner-emitted lesson event. `MarkComplete` applies to text and document
/// lessons, `PlaybackUpdate` to video lessons; the tracker rejects the
/// mismatched pairing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LessonEvent {
    MarkComplete,
    PlaybackUpdate {
        position_seconds: f64,
        duration_seconds: f64,
    },
}

/// Clamp a playback position into a watched ratio in `[0, 1]`. Players may
/// report positions past the end of the stream; those count as fully watched.
pub fn watched_ratio(position_seconds: f64, duration_seconds: f64) -> f64 {
    if duration_seconds <= 0.0 {
        return 0.0;
    }
    (position_seconds / duration_seconds).clamp(0.0, 1.0)
}

/// Aggregate percentage: `floor(100 * completed / total)`. A course with no
/// lessons reports 0, never 100. Recomputing from current counts is the only
/// way this value moves, so it follows structure changes downward as well.
pub fn progress_percentage(completed: u64, total: u64) -> i16 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((completed * 100) / total) as i16
}

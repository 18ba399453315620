//! What the session shows to the operator.

use crate::form::ConfirmationRecord;
use crate::overlay::OverlayRenderer;

/// Operator-facing surface: alerts, the scan toggle, the overlay, the form
/// and the loading indicator.
///
/// Called only from the session's event loop.
pub trait Presenter {
    /// Blocking notice (camera failure, submission result).
    fn alert(&mut self, message: &str);

    /// Scan toggle changed between Idle and Scanning.
    fn scanning_changed(&mut self, scanning: bool);

    /// The overlay layer was redrawn or cleared.
    fn overlay_updated(&mut self, overlay: &OverlayRenderer);

    fn confirmation_opened(&mut self, record: &ConfirmationRecord);

    /// A form field was edited.
    fn confirmation_updated(&mut self, record: &ConfirmationRecord) {
        let _ = record;
    }

    fn confirmation_closed(&mut self);

    /// Show the loading indicator for `activity`.
    fn busy(&mut self, activity: &str);

    /// Hide the loading indicator. `succeeded` is false when the activity
    /// ended in an error the operator is being alerted about.
    fn idle(&mut self, succeeded: bool);
}

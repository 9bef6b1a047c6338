pub(crate) mod event;
pub(crate) mod notification;
pub(crate) mod realtime;

use domain::{EventTypeSet, UnknownEventType};

/// Parses the optional comma-separated `types` query value. Absent or empty
/// means every type.
pub(crate) fn parse_types(types: Option<&str>) -> Result<EventTypeSet, UnknownEventType> {
    types.map_or(Ok(EventTypeSet::all()), EventTypeSet::parse_list)
}

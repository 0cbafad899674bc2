//! Wire data types: the Marmot Group Data Extension and transport events.

pub mod event;
pub mod group_data;

pub use event::{Kind, TransportEvent};
pub use group_data::{GroupDataError, MarmotGroupData, GROUP_DATA_EXTENSION_TYPE};

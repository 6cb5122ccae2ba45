mod counts;
mod prioritize;
mod push;
mod request_queue;
mod state;
mod store;
mod stream;

pub use self::prioritize::Priority;
pub use self::push::{PushAuthorizer, SameOriginPolicy};
pub use self::request_queue::RequestId;
pub use self::state::StreamState;
pub use self::store::StreamRef;
pub use self::stream::StreamEvent;

pub(crate) use self::counts::Counts;
pub(crate) use self::prioritize::{Next, Prioritize, StreamFrame, NUM_PRIORITIES};
pub(crate) use self::push::{PushRegistry, Refused};
pub(crate) use self::request_queue::{Cancelled, RequestQueue};
pub(crate) use self::state::{Cause, State};
pub(crate) use self::store::Store;
pub(crate) use self::stream::{PushState, Stream, StreamKind};

use self::stream::Counted;

use crate::codec::{HeaderBlock, UserError};
use crate::error::Error;
use crate::frame::{Frame, StreamId};
use crate::key::SessionKey;
use crate::proto::*;

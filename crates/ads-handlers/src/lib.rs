//! ads-handlers: the request handlers behind the classifieds routes.
//!
//! Each handler unit takes a [`HandlerRequest`] (`pathParameters` and
//! `body`, the latter either a JSON string or an already-parsed value) and
//! returns a [`HandlerResponse`] (`statusCode` plus a serialized `body`).
//! Handlers touch storage only through the [`ItemStore`] seam, so the same
//! units run behind the local gateway, in the function runtime, and in tests.
//!
//! | Handler | Input | Responses |
//! |---|---|---|
//! | `listAds` | — | 200 |
//! | `createAd` | body `titulo`, `descripcion` | 200, 400 |
//! | `getAd` | path `id` | 200, 400, 404 |
//! | `listComments` | path `id` | 200, 400 |
//! | `createComment` | path `id`, body `usuario`, `mensaje` | 200, 400, 500 |

pub mod contract;
pub mod store;
pub mod units;

pub use contract::{HandlerRequest, HandlerResponse};
pub use store::{Item, ItemStore, MemoryItemStore, StoreError, StoreResult};
pub use units::{HandlerContext, TableLayout, invoke};

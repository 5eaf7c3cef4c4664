//! Action router.
//!
//! The router binds action names to typed handlers. Each registration is
//! wrapped in a [`TypedAction`] that knows how to bind the generic request
//! parameters to the handler's parameter type and how to turn the handler's
//! output back into a generic document. Dispatch only ever sees the
//! type-erased [`ErasedAction`] side.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use super::codec;
use super::protocol::{RawRequest, RawResponse, Request, Response, RetCode};
use super::names::GET_SUPPORTED_ACTIONS;
use crate::error::{ActionError, ActionResult, RouterError};

// =============================================================================
// Handler traits
// =============================================================================

/// A typed action handler.
///
/// Implemented for every `Fn(Request<P>) -> impl Future<Output =
/// ActionResult<D>>`, so plain async functions and closures can be
/// registered directly.
pub trait ActionHandler<P, D>: Send + Sync + 'static {
    /// Runs the action.
    fn call(&self, request: Request<P>) -> BoxFuture<'static, ActionResult<D>>;
}

impl<F, Fut, P, D> ActionHandler<P, D> for F
where
    F: Fn(Request<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult<D>> + Send + 'static,
{
    fn call(&self, request: Request<P>) -> BoxFuture<'static, ActionResult<D>> {
        Box::pin((self)(request))
    }
}

/// The type-erased side of a registered action.
pub trait ErasedAction: Send + Sync {
    /// Binds parameters, runs the handler and converts its output.
    fn call(&self, request: RawRequest) -> BoxFuture<'static, RawResponse>;
}

/// A handler together with its parameter and data shapes.
pub struct TypedAction<H, P, D> {
    handler: H,
    _shape: PhantomData<fn(P) -> D>,
}

impl<H, P, D> TypedAction<H, P, D> {
    /// Wraps `handler`.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _shape: PhantomData,
        }
    }
}

impl<H, P, D> ErasedAction for TypedAction<H, P, D>
where
    H: ActionHandler<P, D>,
    P: DeserializeOwned + Send + 'static,
    D: Serialize + Send + 'static,
{
    fn call(&self, request: RawRequest) -> BoxFuture<'static, RawResponse> {
        let Request {
            action,
            params,
            echo,
        } = request;

        let params = match bind_params::<P>(params) {
            Ok(params) => params,
            Err(e) => {
                debug!(action = %action, error = %e, "Rejected action parameters");
                let response = Response::failed(RetCode::BAD_PARAM, format!("invalid params: {e}"))
                    .with_echo(echo);
                return future::ready(response).boxed();
            }
        };

        let pending = self.handler.call(Request {
            action,
            params,
            echo: echo.clone(),
        });

        async move {
            let response = match pending.await {
                Ok(data) => match serde_json::to_value(data) {
                    Ok(value) => Response::ok(value),
                    Err(e) => Response::failed(
                        RetCode::BAD_HANDLER,
                        format!("failed to serialize action data: {e}"),
                    ),
                },
                Err(err) => Response::from(err),
            };
            response.with_echo(echo)
        }
        .boxed()
    }
}

/// Materializes handler parameters.
///
/// Absent and empty parameters (`null` or `{}`) are bound as an empty object
/// first and only then as `null`, so both struct-shaped and unit-shaped
/// parameter types accept them.
fn bind_params<P: DeserializeOwned>(params: Value) -> Result<P, serde_json::Error> {
    let is_empty = match &params {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if is_empty {
        serde_json::from_value(Value::Object(Map::new())).or_else(|_| serde_json::from_value(Value::Null))
    } else {
        serde_json::from_value(params)
    }
}

// =============================================================================
// ActionMux
// =============================================================================

type ActionTable = RwLock<HashMap<String, Arc<dyn ErasedAction>>>;

/// Registry and dispatcher of actions.
///
/// The built-in `get_supported_actions` action is registered on creation and
/// always reflects the current registry.
pub struct ActionMux {
    actions: Arc<ActionTable>,
}

impl ActionMux {
    /// Creates a router holding only the built-in actions.
    pub fn new() -> Self {
        let actions: Arc<ActionTable> = Arc::new(RwLock::new(HashMap::new()));

        let table: Weak<ActionTable> = Arc::downgrade(&actions);
        let supported = move |_request: Request<Value>| {
            let names = table
                .upgrade()
                .map(|actions| sorted_names(&actions.read()))
                .unwrap_or_default();
            future::ready(Ok::<_, ActionError>(names))
        };
        actions.write().insert(
            GET_SUPPORTED_ACTIONS.to_string(),
            Arc::new(TypedAction::<_, Value, Vec<String>>::new(supported)),
        );

        Self { actions }
    }

    /// Registers `handler` under `name`.
    ///
    /// Registering an existing name replaces the previous handler.
    pub fn register<P, D, H>(&self, name: impl Into<String>, handler: H) -> Result<(), RouterError>
    where
        H: ActionHandler<P, D>,
        P: DeserializeOwned + Send + 'static,
        D: Serialize + Send + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RouterError::InvalidName);
        }

        let entry: Arc<dyn ErasedAction> = Arc::new(TypedAction::<H, P, D>::new(handler));
        if self.actions.write().insert(name.clone(), entry).is_some() {
            debug!(action = %name, "Replaced action handler");
        } else {
            trace!(action = %name, "Registered action handler");
        }
        Ok(())
    }

    /// Returns `true` if `name` has a handler.
    pub fn contains(&self, name: &str) -> bool {
        self.actions.read().contains_key(name)
    }

    /// Returns the sorted names of every registered action.
    pub fn supported_actions(&self) -> Vec<String> {
        sorted_names(&self.actions.read())
    }

    /// Dispatches a generic request to its handler.
    ///
    /// Handler panics propagate to the caller.
    pub async fn dispatch(&self, request: RawRequest) -> RawResponse {
        let entry = self.actions.read().get(&request.action).cloned();

        match entry {
            Some(action) => action.call(request).await,
            None => {
                debug!(action = %request.action, "Unsupported action");
                Response::failed(
                    RetCode::UNSUPPORTED_ACTION,
                    format!("action {} not found", request.action),
                )
                .with_echo(request.echo)
            }
        }
    }

    /// Decodes, dispatches and encodes a raw frame in a single wire mode.
    pub async fn dispatch_bytes(&self, raw: &[u8], binary: bool) -> Vec<u8> {
        let response = match codec::parse_request(raw, binary) {
            Ok(request) => self.dispatch(request).await,
            Err(rejected) => rejected,
        };
        codec::encode_response(&response, binary)
    }
}

impl Default for ActionMux {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActionMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionMux")
            .field("actions", &self.supported_actions())
            .finish()
    }
}

fn sorted_names(actions: &HashMap<String, Arc<dyn ErasedAction>>) -> Vec<String> {
    let mut names: Vec<String> = actions.keys().cloned().collect();
    names.sort();
    names
}

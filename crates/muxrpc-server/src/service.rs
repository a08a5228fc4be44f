//! Method registration.
//!
//! Methods are registered at compile time through typed closures: a
//! handler takes one argument value, populates one reply value, and
//! returns an error string or nothing. That signature is the whole
//! eligibility rule, checked by the compiler instead of a runtime
//! reflection pass. The type-erased [`MethodHandle`] the builder produces
//! knows how to materialize a fresh argument from body bytes, allocate a
//! fresh reply, and invoke itself with both.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use muxrpc_common::protocol::{Result, RpcError};
use muxrpc_common::WireCodec;

/// A decoded argument in flight between the pipeline's read step and the
/// dispatch task that invokes the handler.
pub type BoxedArg = Box<dyn Any + Send>;

type DecodeFn = Box<dyn Fn(WireCodec, &[u8]) -> Result<BoxedArg> + Send + Sync>;
type InvokeFn = Box<dyn Fn(BoxedArg, WireCodec) -> Result<Vec<u8>> + Send + Sync>;

/// An invocable remote method with fixed argument and reply types.
pub struct MethodHandle {
    name: String,
    decode: DecodeFn,
    invoke_fn: InvokeFn,
    num_calls: AtomicU64,
}

impl std::fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodHandle")
            .field("name", &self.name)
            .field("num_calls", &self.num_calls)
            .finish_non_exhaustive()
    }
}

impl MethodHandle {
    fn from_fn<A, R, F>(name: String, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Default + Send + 'static,
        F: Fn(A, &mut R) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        MethodHandle {
            name,
            decode: Box::new(|codec, bytes| {
                let arg: A = codec.decode(bytes)?;
                Ok(Box::new(arg) as BoxedArg)
            }),
            invoke_fn: Box::new(move |arg, codec| {
                let arg = arg
                    .downcast::<A>()
                    .map_err(|_| RpcError::Handler("argument type mismatch".to_string()))?;
                let mut reply = R::default();
                handler(*arg, &mut reply).map_err(RpcError::Handler)?;
                codec.encode(&reply)
            }),
            num_calls: AtomicU64::new(0),
        }
    }

    /// Unqualified method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Materializes a fresh argument value from request body bytes.
    pub fn new_argument(&self, codec: WireCodec, body: &[u8]) -> Result<BoxedArg> {
        (self.decode)(codec, body)
    }

    /// Invokes the handler with a decoded argument and a freshly
    /// allocated reply, returning the encoded reply.
    ///
    /// # Errors
    ///
    /// `Handler` carrying the handler's error text, or an encode error
    /// for the reply.
    pub fn invoke(&self, arg: BoxedArg, codec: WireCodec) -> Result<Vec<u8>> {
        self.num_calls.fetch_add(1, Ordering::Relaxed);
        (self.invoke_fn)(arg, codec)
    }

    /// How many times this method has been invoked. Monotonically
    /// non-decreasing, safe under concurrent invocation.
    pub fn num_calls(&self) -> u64 {
        self.num_calls.load(Ordering::Relaxed)
    }
}

/// A named group of methods, registered into a
/// [`Server`](crate::Server) as one unit.
pub struct Service {
    name: String,
    methods: HashMap<String, Arc<MethodHandle>>,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a method by its unqualified name.
    pub fn method(&self, name: &str) -> Option<Arc<MethodHandle>> {
        self.methods.get(name).cloned()
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Builder recording typed method closures for one service.
///
/// # Example
///
/// ```
/// use muxrpc_server::ServiceBuilder;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct SumArgs { a: i64, b: i64 }
///
/// let foo = ServiceBuilder::new("Foo")
///     .method("Sum", |args: SumArgs, reply: &mut i64| {
///         *reply = args.a + args.b;
///         Ok(())
///     })
///     .build();
/// assert!(foo.method("Sum").is_some());
/// ```
pub struct ServiceBuilder {
    name: String,
    methods: HashMap<String, Arc<MethodHandle>>,
}

impl ServiceBuilder {
    /// Starts a service named `name`.
    ///
    /// # Panics
    ///
    /// If the name is empty. Registration mistakes are programming
    /// errors and fail fast at startup.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            panic!("service name must not be empty");
        }
        ServiceBuilder {
            name,
            methods: HashMap::new(),
        }
    }

    /// Registers a method.
    ///
    /// The handler receives the decoded argument and a mutable reference
    /// to a freshly allocated reply; returning `Err` carries the text
    /// back to the caller in the response header.
    ///
    /// # Panics
    ///
    /// If `name` contains a `.` (it would be unreachable, since
    /// resolution splits the qualified name on the last dot), or if the
    /// method is already registered.
    pub fn method<A, R, F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Default + Send + 'static,
        F: Fn(A, &mut R) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() || name.contains('.') {
            panic!("invalid method name: {:?}", name);
        }
        tracing::debug!(service = %self.name, method = %name, "register method");
        let handle = Arc::new(MethodHandle::from_fn(name.clone(), handler));
        if self.methods.insert(name.clone(), handle).is_some() {
            panic!("method already registered: {}.{}", self.name, name);
        }
        self
    }

    pub fn build(self) -> Service {
        Service {
            name: self.name,
            methods: self.methods,
        }
    }
}

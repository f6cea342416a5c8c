//! Hook registration and dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;

use super::HookEvent;
use crate::types::{TransitError, TransitResult};

type ObserverFn<E> = Arc<
    dyn Fn(<E as HookEvent>::Args) -> LocalBoxFuture<'static, TransitResult<()>> + Send + Sync,
>;

type ReplacerFn<E> = Arc<
    dyn Fn(
            <E as HookEvent>::Args,
            DefaultHandler<E>,
        ) -> LocalBoxFuture<'static, TransitResult<<E as HookEvent>::Output>>
        + Send
        + Sync,
>;

/// Options for an observer registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookOptions {
    /// Run before the default (or replacing) handler instead of after it.
    pub before: bool,
    /// Remove the handler after its first run.
    pub once: bool,
}

/// The default implementation of a step, handed to the replacing handler.
///
/// Calling it runs the step as if no replacement was registered.
pub struct DefaultHandler<E: HookEvent> {
    run: Box<dyn FnOnce(E::Args) -> LocalBoxFuture<'static, TransitResult<E::Output>>>,
}

impl<E: HookEvent> DefaultHandler<E> {
    fn new<D, Fut>(default: D) -> Self
    where
        D: FnOnce(E::Args) -> Fut + 'static,
        Fut: Future<Output = TransitResult<E::Output>> + 'static,
    {
        Self {
            run: Box::new(move |args| default(args).boxed_local()),
        }
    }

    /// Run the default implementation with `args`.
    pub async fn call(self, args: E::Args) -> TransitResult<E::Output> {
        (self.run)(args).await
    }
}

impl<E: HookEvent> fmt::Debug for DefaultHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DefaultHandler({})", E::NAME)
    }
}

enum Role<E: HookEvent> {
    Observer(ObserverFn<E>),
    Replacer(ReplacerFn<E>),
}

impl<E: HookEvent> Clone for Role<E> {
    fn clone(&self) -> Self {
        match self {
            Role::Observer(f) => Role::Observer(Arc::clone(f)),
            Role::Replacer(f) => Role::Replacer(Arc::clone(f)),
        }
    }
}

struct Entry<E: HookEvent> {
    id: u64,
    options: HookOptions,
    role: Role<E>,
}

impl<E: HookEvent> Clone for Entry<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            options: self.options,
            role: self.role.clone(),
        }
    }
}

struct Chain<E: HookEvent> {
    entries: Vec<Entry<E>>,
}

impl<E: HookEvent> Chain<E> {
    fn has_replacer(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry.role, Role::Replacer(_)))
    }

    /// Entries to run for one call. `once` entries leave the chain here.
    fn snapshot(&mut self) -> Vec<Entry<E>> {
        let snapshot = self.entries.clone();
        self.entries.retain(|entry| !entry.options.once);
        snapshot
    }
}

/// Type-erased chain so handles can unregister without knowing the event type.
trait ErasedChain: Send {
    fn remove(&mut self, id: u64) -> bool;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<E: HookEvent> ErasedChain for Chain<E> {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    chains: HashMap<&'static str, Box<dyn ErasedChain>>,
}

/// Returned by every registration; removes the handler again.
#[derive(Debug, Clone)]
pub struct HookHandle {
    hook: &'static str,
    id: u64,
    registry: Weak<Mutex<Inner>>,
}

impl HookHandle {
    /// Name of the hook the handler was registered on.
    pub fn hook(&self) -> &'static str {
        self.hook
    }

    /// Remove the handler. Returns false if it was already gone.
    pub fn unregister(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner
            .chains
            .get_mut(self.hook)
            .is_some_and(|chain| chain.remove(self.id))
    }
}

/// Registry of handler chains, one chain per hook name.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct HookRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async observer that runs after the step.
    pub fn on<E, F, Fut>(&self, handler: F) -> TransitResult<HookHandle>
    where
        E: HookEvent,
        F: Fn(E::Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TransitResult<()>> + 'static,
    {
        self.on_with::<E, F, Fut>(handler, HookOptions::default())
    }

    /// Register an async observer with explicit options.
    pub fn on_with<E, F, Fut>(&self, handler: F, options: HookOptions) -> TransitResult<HookHandle>
    where
        E: HookEvent,
        F: Fn(E::Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TransitResult<()>> + 'static,
    {
        let observer: ObserverFn<E> = Arc::new(move |args| handler(args).boxed_local());
        self.insert::<E>(Role::Observer(observer), options)
    }

    /// Register a synchronous observer that runs after the step.
    pub fn on_sync<E, F>(&self, handler: F) -> TransitResult<HookHandle>
    where
        E: HookEvent,
        F: Fn(E::Args) -> TransitResult<()> + Send + Sync + 'static,
    {
        self.on_with::<E, _, _>(move |args| future::ready(handler(args)), HookOptions::default())
    }

    /// Register the replacing handler of a step. Its result becomes the
    /// step's result; it may run the default through the [`DefaultHandler`].
    ///
    /// Fails if the hook already has a replacing handler.
    pub fn replace<E, F, Fut>(&self, handler: F) -> TransitResult<HookHandle>
    where
        E: HookEvent,
        F: Fn(E::Args, DefaultHandler<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TransitResult<E::Output>> + 'static,
    {
        let replacer: ReplacerFn<E> =
            Arc::new(move |args, default| handler(args, default).boxed_local());
        self.insert::<E>(Role::Replacer(replacer), HookOptions::default())
    }

    /// Number of handlers registered on `E`.
    pub fn count<E: HookEvent>(&self) -> usize {
        self.lock()
            .chains
            .get(E::NAME)
            .map_or(0, |chain| chain.len())
    }

    /// Whether `E` has a replacing handler.
    pub fn has_replacer<E: HookEvent>(&self) -> bool {
        self.lock()
            .chains
            .get(E::NAME)
            .and_then(|chain| chain.as_any().downcast_ref::<Chain<E>>())
            .is_some_and(Chain::has_replacer)
    }

    /// Run the step `E`.
    ///
    /// Observers flagged `before` run first, then the replacing handler if
    /// one is registered (otherwise `default`), then the remaining observers.
    /// Each phase runs in registration order and every handler is awaited
    /// before the next starts. The first handler error aborts the call.
    pub async fn call<E, D, Fut>(&self, args: E::Args, default: D) -> TransitResult<E::Output>
    where
        E: HookEvent,
        D: FnOnce(E::Args) -> Fut + 'static,
        Fut: Future<Output = TransitResult<E::Output>> + 'static,
    {
        let mut replacer = None;
        let mut before = Vec::new();
        let mut after = Vec::new();
        for entry in self.snapshot::<E>() {
            match entry.role {
                Role::Replacer(handler) => replacer = Some(handler),
                Role::Observer(handler) if entry.options.before => before.push(handler),
                Role::Observer(handler) => after.push(handler),
            }
        }

        tracing::trace!(
            "hook {}: {} before, {} after, replaced: {}",
            E::NAME,
            before.len(),
            after.len(),
            replacer.is_some()
        );

        for handler in &before {
            handler(args.clone()).await?;
        }

        let output = match replacer {
            Some(handler) => handler(args.clone(), DefaultHandler::new(default)).await?,
            None => default(args.clone()).await?,
        };

        for handler in &after {
            handler(args.clone()).await?;
        }

        Ok(output)
    }

    /// Announce `E`, a hook without a default implementation.
    pub async fn emit<E>(&self, args: E::Args) -> TransitResult<()>
    where
        E: HookEvent<Output = ()>,
    {
        self.call::<E, _, _>(args, |_| future::ready(Ok(()))).await
    }

    fn insert<E: HookEvent>(&self, role: Role<E>, options: HookOptions) -> TransitResult<HookHandle> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;

        let chain = inner
            .chains
            .entry(E::NAME)
            .or_insert_with(|| Box::new(Chain::<E> { entries: Vec::new() }));
        let Some(chain) = chain.as_any_mut().downcast_mut::<Chain<E>>() else {
            return Err(TransitError::hook(
                E::NAME,
                "hook name is already bound to a different event type",
            ));
        };

        if matches!(role, Role::Replacer(_)) && chain.has_replacer() {
            return Err(TransitError::hook(
                E::NAME,
                "a replacing handler is already registered",
            ));
        }

        chain.entries.push(Entry { id, options, role });
        Ok(HookHandle {
            hook: E::NAME,
            id,
            registry: Arc::downgrade(&self.inner),
        })
    }

    fn snapshot<E: HookEvent>(&self) -> Vec<Entry<E>> {
        self.lock()
            .chains
            .get_mut(E::NAME)
            .and_then(|chain| chain.as_any_mut().downcast_mut::<Chain<E>>())
            .map(Chain::snapshot)
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        let mut map = f.debug_map();
        for (name, chain) in &inner.chains {
            map.entry(name, &chain.len());
        }
        map.finish()
    }
}

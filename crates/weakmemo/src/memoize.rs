//! Memoized: a callable wrapped with a key trie

use std::convert::Infallible;
use std::fmt;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::callable::{Callable, Fallible, Function, Method};
use crate::error::Result;
use crate::key::Value;
use crate::options::MemoizeOptions;
use crate::stats::CacheStats;
use crate::trie::Node;

/// Wrap an infallible function; the receiver is ignored
pub fn memoize<F, R>(f: F) -> Memoized<Function<F>>
where
    F: Fn(&[Value]) -> R,
    R: Clone,
{
    Memoized::new(Function(f))
}

/// Wrap an infallible function that reads its receiver
pub fn memoize_method<F, R>(f: F) -> Memoized<Method<F>>
where
    F: Fn(&Value, &[Value]) -> R,
    R: Clone,
{
    Memoized::new(Method(f))
}

/// Wrap a fallible function; errors pass through and are never cached
pub fn try_memoize<F, R, E>(f: F) -> Memoized<Fallible<F>>
where
    F: Fn(Option<&Value>, &[Value]) -> std::result::Result<R, E>,
    R: Clone,
{
    Memoized::new(Fallible(f))
}

/// Trie roots for one memoizer
struct CacheState<R> {
    /// Calls without a keyed receiver; its own result is the zero-argument slot
    unbound: Node<R>,
    /// Children keyed by receiver, each the root of that receiver's calls
    bound: Node<R>,
}

impl<R> CacheState<R> {
    fn new() -> Self {
        Self {
            unbound: Node::new(),
            bound: Node::new(),
        }
    }

    fn lookup(&self, receiver: Option<&Value>, args: &[Value]) -> Option<&R> {
        let root = match receiver {
            Some(receiver) => self.bound.child(receiver)?,
            None => &self.unbound,
        };
        root.find(args)?.result.as_ref()
    }

    fn entry(
        &mut self,
        receiver: Option<&Value>,
        args: &[Value],
        sweep_threshold: usize,
        reclaimed: &mut usize,
    ) -> &mut Node<R> {
        let root = match receiver {
            Some(receiver) => self.bound.child_or_insert(receiver, sweep_threshold, reclaimed),
            None => &mut self.unbound,
        };
        root.entry(args, sweep_threshold, reclaimed)
    }

    /// Remove the subtree addressed by `receiver` + `keys`
    fn invalidate(&mut self, receiver: Option<&Value>, keys: &[Value]) -> bool {
        let Some((last, prefix)) = keys.split_last() else {
            return match receiver {
                Some(receiver) => self.bound.remove_child(receiver).is_some(),
                None => {
                    *self = Self::new();
                    true
                }
            };
        };

        let root = match receiver {
            Some(receiver) => self.bound.child_mut(receiver),
            None => Some(&mut self.unbound),
        };
        root.and_then(|node| node.find_mut(prefix))
            .and_then(|node| node.remove_child(last))
            .is_some()
    }

    fn len(&self) -> usize {
        self.unbound.len() + self.bound.len()
    }

    fn purge(&mut self) -> usize {
        self.unbound.purge() + self.bound.purge()
    }
}

/// A memoized callable
///
/// Results are cached per key sequence: the keyed receiver (if any) followed
/// by the arguments. Primitives match by value, objects and functions by
/// identity. Object keys are held weakly: dropping the last `Arc` behind an
/// argument makes every entry keyed on it unreachable, and the memory is
/// reclaimed on the next sweep of that table or by [`Memoized::purge`].
///
/// Cached results are held strongly. A result that owns an `Arc` to one of
/// its own reference keys (an identity function, say) keeps that key alive,
/// so its entry never dies on its own; only [`Memoized::clear`] or
/// [`Memoized::clear_on`] for that key releases it. Return a `Weak` instead
/// when the result must not extend the key's lifetime.
///
/// The trie sits behind a mutex that is released while the wrapped callable
/// runs, so memoized functions may call themselves. Two threads missing the
/// same key at once may both run the callable; the first stored result is
/// returned to both.
pub struct Memoized<C: Callable> {
    callable: C,
    state: Mutex<CacheState<C::Output>>,
    stats: CacheStats,
    options: MemoizeOptions,
}

impl<C> Memoized<C>
where
    C: Callable,
    C::Output: Clone,
{
    /// Wrap a callable with default options
    pub fn new(callable: C) -> Self {
        Self {
            callable,
            state: Mutex::new(CacheState::new()),
            stats: CacheStats::new(),
            options: MemoizeOptions::default(),
        }
    }

    /// Wrap a callable with the given options
    ///
    /// # Returns
    /// * `Result<Memoized<C>>` - Error if the options fail validation
    pub fn with_options(callable: C, options: MemoizeOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            callable,
            state: Mutex::new(CacheState::new()),
            stats: CacheStats::new(),
            options,
        })
    }

    /// Call without a receiver
    pub fn try_call(&self, args: &[Value]) -> std::result::Result<C::Output, C::Error> {
        self.invoke(None, args)
    }

    /// Call on a receiver
    ///
    /// An `Undefined` receiver is the no-receiver state and shares entries
    /// with [`Memoized::try_call`].
    pub fn try_call_on(
        &self,
        receiver: &Value,
        args: &[Value],
    ) -> std::result::Result<C::Output, C::Error> {
        self.invoke(Some(receiver), args)
    }

    /// Forget cached results
    ///
    /// With no keys the whole cache and its statistics are reset. Otherwise
    /// every result whose arguments start with `keys` is dropped, including
    /// the call with exactly `keys`. Unknown keys are ignored.
    pub fn clear(&self, keys: &[Value]) {
        self.invalidate(None, keys);
    }

    /// Forget cached results for calls on `receiver`
    ///
    /// With no keys every entry for the receiver is dropped. When the
    /// receiver is not part of the key (receiver keying is off, or the
    /// receiver is `Undefined`) `keys` address the unbound entries instead,
    /// and an empty `keys` does nothing; use [`Memoized::clear`] to reset.
    pub fn clear_on(&self, receiver: &Value, keys: &[Value]) {
        if keys.is_empty() && self.keyed_receiver(Some(receiver)).is_none() {
            debug!(label = self.label(), "receiver not keyed, nothing cleared");
            return;
        }
        self.invalidate(Some(receiver), keys);
    }

    /// Reclaim entries whose object keys have been dropped
    ///
    /// # Returns
    /// * `usize` - Number of branch entries removed
    pub fn purge(&self) -> usize {
        let reclaimed = self.state.lock().purge();
        self.stats.record_reclaimed(reclaimed);
        debug!(label = self.label(), reclaimed, "purged dead keys");
        reclaimed
    }

    /// Number of cached results reachable through live keys
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// Check if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get memoizer statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get the options in effect
    pub fn options(&self) -> &MemoizeOptions {
        &self.options
    }

    /// Get the wrapped callable
    pub fn callable(&self) -> &C {
        &self.callable
    }

    fn label(&self) -> &str {
        self.options.name().unwrap_or("anonymous")
    }

    /// Receiver as it participates in the key, if at all
    fn keyed_receiver<'a>(&self, receiver: Option<&'a Value>) -> Option<&'a Value> {
        receiver.filter(|receiver| self.options.keys_receiver() && !receiver.is_undefined())
    }

    fn invoke(
        &self,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> std::result::Result<C::Output, C::Error> {
        let keyed = self.keyed_receiver(receiver);

        let cached = self.state.lock().lookup(keyed, args).cloned();
        if let Some(result) = cached {
            self.stats.record_hit();
            trace!(label = self.label(), depth = args.len(), "memo hit");
            return Ok(result);
        }

        self.stats.record_miss();
        trace!(label = self.label(), depth = args.len(), "memo miss");

        // Lock is not held here; the callable may re-enter this memoizer
        let result = match self.callable.invoke(receiver, args) {
            Ok(result) => result,
            Err(err) => {
                trace!(label = self.label(), depth = args.len(), "call failed, nothing cached");
                return Err(err);
            }
        };

        let mut reclaimed = 0;
        let stored = {
            let mut state = self.state.lock();
            let node = state.entry(keyed, args, self.options.threshold(), &mut reclaimed);
            match node.result.clone() {
                Some(existing) => existing,
                None => {
                    node.result = Some(result.clone());
                    self.stats.record_insert();
                    trace!(label = self.label(), depth = args.len(), "memo insert");
                    result
                }
            }
        };
        self.stats.record_reclaimed(reclaimed);

        Ok(stored)
    }

    fn invalidate(&self, receiver: Option<&Value>, keys: &[Value]) {
        let keyed = self.keyed_receiver(receiver);

        if keyed.is_none() && keys.is_empty() {
            *self.state.lock() = CacheState::new();
            self.stats.reset();
            debug!(label = self.label(), "cache reset");
            return;
        }

        let removed = self.state.lock().invalidate(keyed, keys);
        if removed {
            self.stats.record_invalidation();
        }
        debug!(label = self.label(), depth = keys.len(), removed, "cache cleared");
    }
}

impl<C> Memoized<C>
where
    C: Callable<Error = Infallible>,
    C::Output: Clone,
{
    /// Call without a receiver
    pub fn call(&self, args: &[Value]) -> C::Output {
        match self.try_call(args) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Call on a receiver
    pub fn call_on(&self, receiver: &Value, args: &[Value]) -> C::Output {
        match self.try_call_on(receiver, args) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }
}

impl<C: Callable> fmt::Debug for Memoized<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("options", &self.options)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

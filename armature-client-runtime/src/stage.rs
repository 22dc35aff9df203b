//! Stage chains.
//!
//! A [`Stage`] consumes a value and returns a [`Continuation`]: the (possibly
//! transformed) value and, optionally, the stage to run next. A stage may also
//! halt the chain with a value of type `H`, which is how the request pipeline
//! reports an abort or a filter failure without unwinding.
//!
//! [`process`] drives a chain iteratively, so the stack depth stays the same
//! however many stages are linked together.
//!
//! ```
//! use armature_client_runtime::stage::{self, Stages};
//! use std::convert::Infallible;
//!
//! let root = Stages::chain(|n: u32| Ok::<_, Infallible>(n + 1))
//!     .to(|n| Ok(n * 10))
//!     .build();
//!
//! assert_eq!(stage::process(1, &root), Ok(20));
//! ```

use std::sync::Arc;

/// Shared handle to a stage.
pub type StageRef<T, H> = Arc<dyn Stage<T, H>>;

type Transform<T, H> = Box<dyn Fn(T) -> Result<T, H> + Send + Sync>;

/// A unit of pipeline processing.
pub trait Stage<T, H>: Send + Sync {
    /// Process the value and decide what runs next.
    fn apply(&self, data: T) -> Result<Continuation<T, H>, H>;
}

/// Result of a single stage hop.
pub struct Continuation<T, H> {
    result: T,
    next: Option<StageRef<T, H>>,
}

impl<T, H> Continuation<T, H> {
    /// Continue with `next`, or stop if it is `None`.
    pub fn of(result: T, next: Option<StageRef<T, H>>) -> Self {
        Self { result, next }
    }

    /// Stop the chain with `result`.
    pub fn terminal(result: T) -> Self {
        Self { result, next: None }
    }

    /// The value produced by the stage.
    pub fn result(&self) -> &T {
        &self.result
    }

    /// The stage to run next, if any.
    pub fn next(&self) -> Option<&StageRef<T, H>> {
        self.next.as_ref()
    }

    /// Whether the chain ends here.
    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }
}

/// Run `data` through the chain starting at `root`.
pub fn process<T, H>(data: T, root: &StageRef<T, H>) -> Result<T, H> {
    let mut continuation = root.apply(data)?;
    loop {
        let Continuation { result, next } = continuation;
        match next {
            Some(stage) => continuation = stage.apply(result)?,
            None => return Ok(result),
        }
    }
}

/// Stage constructors.
pub struct Stages;

impl Stages {
    /// A stage that passes its input through and ends the chain.
    pub fn identity<T: 'static, H: 'static>() -> StageRef<T, H> {
        Arc::new(Identity)
    }

    /// Start a chain with a transformation step.
    pub fn chain<T, H, F>(transform: F) -> ChainBuilder<T, H>
    where
        F: Fn(T) -> Result<T, H> + Send + Sync + 'static,
    {
        ChainBuilder {
            transforms: vec![Box::new(transform)],
        }
    }
}

struct Identity;

impl<T, H> Stage<T, H> for Identity {
    fn apply(&self, data: T) -> Result<Continuation<T, H>, H> {
        Ok(Continuation::terminal(data))
    }
}

/// Stage wrapping a plain transformation, linked to a fixed successor.
struct LinkedStage<T, H> {
    transform: Transform<T, H>,
    next: Option<StageRef<T, H>>,
}

impl<T, H> Stage<T, H> for LinkedStage<T, H> {
    fn apply(&self, data: T) -> Result<Continuation<T, H>, H> {
        let result = (self.transform)(data)?;
        Ok(Continuation::of(result, self.next.clone()))
    }
}

/// Builder composing transformation steps in a fixed order.
pub struct ChainBuilder<T, H> {
    transforms: Vec<Transform<T, H>>,
}

impl<T: 'static, H: 'static> ChainBuilder<T, H> {
    /// Append a transformation step.
    pub fn to<F>(mut self, transform: F) -> Self
    where
        F: Fn(T) -> Result<T, H> + Send + Sync + 'static,
    {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Finish the chain; the last step terminates it.
    pub fn build(self) -> StageRef<T, H> {
        self.link(None)
    }

    /// Finish the chain, handing over to `last` after the final step.
    pub fn build_to(self, last: StageRef<T, H>) -> StageRef<T, H> {
        self.link(Some(last))
    }

    fn link(self, tail: Option<StageRef<T, H>>) -> StageRef<T, H> {
        let mut next = tail;
        for transform in self.transforms.into_iter().rev() {
            next = Some(Arc::new(LinkedStage { transform, next }));
        }
        next.unwrap_or_else(Stages::identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::Weak;

    #[test]
    fn test_chain_runs_in_order() {
        let root = Stages::chain(|v: Vec<u8>| {
            let mut v = v;
            v.push(1);
            Ok::<_, Infallible>(v)
        })
        .to(|mut v| {
            v.push(2);
            Ok(v)
        })
        .build_to(Stages::identity());

        assert_eq!(process(Vec::new(), &root), Ok(vec![1, 2]));
    }

    #[test]
    fn test_halt_stops_chain() {
        let root = Stages::chain(|n: i32| if n < 0 { Err("negative") } else { Ok(n) })
            .to(|n| Ok(n + 100))
            .build();

        assert_eq!(process(-1, &root), Err("negative"));
        assert_eq!(process(1, &root), Ok(101));
    }

    #[test]
    fn test_identity() {
        let root: StageRef<&str, Infallible> = Stages::identity();
        let continuation = root.apply("same").unwrap();
        assert!(continuation.is_terminal());
        assert_eq!(*continuation.result(), "same");
    }

    struct Countdown {
        me: Weak<Countdown>,
    }

    impl Stage<u64, Infallible> for Countdown {
        fn apply(&self, n: u64) -> Result<Continuation<u64, Infallible>, Infallible> {
            if n == 0 {
                return Ok(Continuation::terminal(0));
            }
            let next = self.me.upgrade().map(|s| s as StageRef<u64, Infallible>);
            Ok(Continuation::of(n - 1, next))
        }
    }

    #[test]
    fn test_long_chains_do_not_grow_the_stack() {
        let countdown = Arc::new_cyclic(|me| Countdown { me: me.clone() });
        let root: StageRef<u64, Infallible> = countdown;
        assert_eq!(process(1_000_000, &root), Ok(0));
    }
}

use futures::{Stream, StreamExt};
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::debug;

/// Something a bound value is rendered into.
pub trait RenderTarget: Send + 'static {
    /// Default loading state, used when no placeholder is supplied.
    fn shimmer(&mut self);

    /// Leaves the loading state. Called exactly once, before the first update.
    fn clear_loading(&mut self);
}

/// A target that can be shown or hidden.
pub trait Visibility {
    fn set_visible(&mut self, visible: bool);
}

type Updater<T, V> = Box<dyn FnMut(V, &mut T) + Send>;
type Placeholder<T> = Box<dyn FnOnce(&mut T) + Send>;

/// Binds an initial value plus a live update stream to a render target.
///
/// The target shows a loading state until the initial value resolves. Only
/// then is the update stream registered, so the initial value is always
/// rendered before any streamed one.
pub struct Reactive<T, V> {
    target: T,
    update: Updater<T, V>,
    placeholder: Option<Placeholder<T>>,
}

impl<T, V> Reactive<T, V>
where
    T: RenderTarget,
    V: Send + 'static,
{
    pub fn new(target: T, update: impl FnMut(V, &mut T) + Send + 'static) -> Self {
        Self {
            target,
            update: Box::new(update),
            placeholder: None,
        }
    }

    /// Renders custom loading content instead of the default shimmer.
    pub fn with_placeholder(mut self, placeholder: impl FnOnce(&mut T) + Send + 'static) -> Self {
        self.placeholder = Some(Box::new(placeholder));
        self
    }

    /// Starts the binding. `register` is called once `init` has resolved and
    /// its value has been rendered; every event of the stream it returns is
    /// passed through `transform` and rendered in delivery order.
    pub fn bind<I, R, S, E, X>(self, init: I, register: R, mut transform: X) -> BindingHandle
    where
        I: Future<Output = V> + Send + 'static,
        R: FnOnce() -> S + Send + 'static,
        S: Stream<Item = E> + Send + 'static,
        E: Send + 'static,
        X: FnMut(E) -> V + Send + 'static,
    {
        let Self {
            mut target,
            mut update,
            placeholder,
        } = self;

        match placeholder {
            Some(placeholder) => placeholder(&mut target),
            None => target.shimmer(),
        }

        let task = tokio::spawn(async move {
            let initial = init.await;
            target.clear_loading();
            update(initial, &mut target);

            let mut events = Box::pin(register());
            while let Some(event) = events.next().await {
                update(transform(event), &mut target);
            }
            debug!("Reactive binding stream ended");
        });

        BindingHandle { task }
    }
}

/// Live binding. Dropping the handle, or calling [`BindingHandle::dispose`],
/// stops all further updates.
#[must_use = "dropping a BindingHandle cancels the binding"]
pub struct BindingHandle {
    task: JoinHandle<()>,
}

impl BindingHandle {
    pub fn dispose(self) {
        // Drop does the work.
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for BindingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Shows a fallback target instead of the primary one while the bound value is
/// absent.
pub struct NullFallback<P, F> {
    primary: P,
    fallback: F,
}

impl<P: Visibility, F: Visibility> NullFallback<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }

    pub fn apply<T>(&mut self, value: Option<T>) -> Option<T> {
        let present = value.is_some();
        self.fallback.set_visible(!present);
        self.primary.set_visible(present);
        value
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }
}

//! TCP listener for console-protocol clients.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lfosc_config::ListenerMode;
use tracing::{info, trace, warn};

use super::{
    LISTENER_TARGET, ListenerContext, ListenerEndpoint, ListenerError, ListenerHandle,
    ListenerSettings, resolve_addr, session, spawn_worker,
};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

pub(super) fn launch(
    settings: &ListenerSettings,
    context: ListenerContext,
) -> Result<ListenerHandle, ListenerError> {
    let addr = resolve_addr(&settings.bind_address, settings.console_port)?;
    let listener =
        TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })?;
    listener
        .set_nonblocking(true)
        .map_err(|source| ListenerError::Configure { source })?;
    let local = listener
        .local_addr()
        .map_err(|source| ListenerError::Configure { source })?;
    let worker = spawn_worker(ListenerMode::Console, move || {
        info!(target: LISTENER_TARGET, endpoint = %local, "console listener active");
        serve_connections(|| listener.accept().map(|(stream, _)| stream), &context);
    })?;
    Ok(ListenerHandle::new(
        ListenerMode::Console,
        ListenerEndpoint::Socket(local),
        worker,
    ))
}

/// Accepts sessions until cancelled, escalating fatal accept failures.
fn serve_connections<A>(accept: A, context: &ListenerContext)
where
    A: FnMut() -> io::Result<TcpStream>,
{
    if let Err(error) = run_accept_loop(accept, context) {
        warn!(target: LISTENER_TARGET, error = %error, "console listener failed");
        context.fail(ListenerMode::Console, &error);
    }
}

fn run_accept_loop<A>(mut accept: A, context: &ListenerContext) -> Result<(), ListenerError>
where
    A: FnMut() -> io::Result<TcpStream>,
{
    while !context.cancel.is_cancelled() {
        match accept() {
            Ok(stream) => {
                let registry = Arc::clone(&context.registry);
                let cancel = context.cancel.clone();
                thread::spawn(move || session::serve(stream, &registry, &cancel));
            }
            Err(error) if is_idle(&error) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) if is_transient(&error) => {
                trace!(target: LISTENER_TARGET, error = %error, "ignoring console accept error");
                thread::sleep(ERROR_BACKOFF);
            }
            Err(source) => return Err(ListenerError::Accept { source }),
        }
    }
    info!(target: LISTENER_TARGET, "console listener stopped");
    Ok(())
}

fn is_idle(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Failures confined to one pending connection.
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset
    )
}

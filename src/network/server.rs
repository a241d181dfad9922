use crate::error::Result;
use crate::network::message_handler::serve;
use crate::network::operations::send_version;
use crate::node::NodeContext;
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};

/// The node's accept loop. Each inbound connection is handled on its own
/// task; SIGINT/SIGTERM stops accepting and flushes the store. In-flight
/// handlers are abandoned with the process.
pub struct Server {
    ctx: NodeContext,
}

impl Server {
    pub fn new(ctx: NodeContext) -> Server {
        Server { ctx }
    }

    pub async fn run(&self) -> Result<()> {
        let node_addr = self.ctx.node_addr().to_string();
        let listener = TcpListener::bind(&node_addr)
            .await
            .expect("TcpListener bind error");
        info!("Listening on {}", node_addr);

        // Everyone but the central node announces itself on startup.
        if !self.ctx.is_central_node()? {
            let best_height = self.ctx.blockchain().get_best_height().await?;
            let central_node = self.ctx.known_nodes().central_node()?;
            send_version(&self.ctx, &central_node, best_height).await;
        }

        let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler install error");
        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler install error");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let ctx = self.ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve(ctx, stream).await {
                                error!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => error!("Accept error: {}", e),
                },
                _ = sigint.recv() => break,
                _ = sigterm.recv() => break,
            }
        }

        info!("Shutting down, flushing the store");
        self.ctx.blockchain().flush()?;
        Ok(())
    }
}

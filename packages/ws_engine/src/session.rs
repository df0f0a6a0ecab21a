//! Per-connection session task.
//!
//! Two halves run concurrently on one task: the reader decodes frames in
//! arrival order and dispatches messages; the writer drains control frames,
//! the outbound queue and the heartbeat. The reader talks to the writer only
//! through the control channel, and dropping that channel ends the writer.

use std::sync::Arc;

use permessage_deflate::{CompressionContext, DeflateParams, Role};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ws_frame::{
    AssembledMessage, Frame, FrameDecoder, Opcode, Reassembler, close_code, encode, encode_into,
    fragment_message,
};

use crate::connection::Connection;
use crate::error::EngineError;
use crate::message::{Message, MessageKind};
use crate::outbound;
use crate::server::Server;

const READ_CHUNK: usize = 16 * 1024;
const CONTROL_QUEUE: usize = 16;

enum Flow {
    Continue,
    Closed,
}

impl Server {
    /// Drive one upgraded connection until either side closes it.
    ///
    /// `deflate` carries the parameters from [`Server::negotiate_extensions`]
    /// when the handshake accepted permessage-deflate. The connection is
    /// registered for the life of the call; a full registry gets a 1013 close
    /// and [`EngineError::Capacity`].
    pub async fn serve<S>(
        self: &Arc<Self>,
        mut stream: S,
        id: impl Into<String>,
        deflate: Option<DeflateParams>,
    ) -> Result<(), EngineError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = self.config();
        let (tx, rx) = outbound::channel(config.outbound_queue_size, config.backpressure_threshold);
        let conn = Arc::new(Connection::new(id).with_outbound(tx).with_deflate(deflate));

        if let Err(e) = self.add_connection(Arc::clone(&conn)) {
            let close = Frame::close(e.close_code(), "server at capacity");
            stream.write_all(&encode(&close)?).await?;
            stream.shutdown().await?;
            return Err(e);
        }

        if let Err(e) = self.handle_connect(Arc::clone(&conn)).await {
            warn!(connection_id = %conn.id(), error = %e, "connect handler failed");
            let close = Frame::close(close_code::INTERNAL_ERROR, "");
            let _ = stream.write_all(&encode(&close)?).await;
            self.disconnect(conn.id()).await;
            return Err(EngineError::Handler(e));
        }

        info!(connection_id = %conn.id(), deflate = deflate.is_some(), "session started");

        let (read_half, write_half) = tokio::io::split(stream);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
        // Lets a failed writer stop the reader without touching the server.
        let writer_done = conn.cancellation().child_token();

        let reader = Reader {
            server: Arc::clone(self),
            conn: Arc::clone(&conn),
            io: read_half,
            decoder: FrameDecoder::new(config.max_frame_size),
            reassembler: Reassembler::new(config.max_message_size),
            inflater: deflate
                .map(|params| CompressionContext::new(params, config.deflate.clone(), Role::Server)),
            control: control_tx,
            require_masked: config.require_masked_frames,
        };
        let writer = Writer {
            server: Arc::clone(self),
            conn: Arc::clone(&conn),
            io: write_half,
            control: control_rx,
            outbound: rx,
            deflater: deflate
                .map(|params| CompressionContext::new(params, config.deflate.clone(), Role::Server)),
            max_frame_size: config.max_frame_size,
        };

        let (read_result, write_result) =
            tokio::join!(reader.run(writer_done.clone()), writer.run(writer_done));

        self.disconnect(conn.id()).await;
        info!(connection_id = %conn.id(), "session ended");

        read_result.and(write_result)
    }
}

struct Reader<R> {
    server: Arc<Server>,
    conn: Arc<Connection>,
    io: R,
    decoder: FrameDecoder,
    reassembler: Reassembler,
    inflater: Option<CompressionContext>,
    control: mpsc::Sender<Frame>,
    require_masked: bool,
}

impl<S: AsyncRead> Reader<ReadHalf<S>> {
    async fn run(mut self, stop: CancellationToken) -> Result<(), EngineError> {
        let result = self.read_loop(&stop).await;
        if let Err(e) = &result {
            if e.is_protocol() {
                self.server.metrics().protocol_error();
            }
            warn!(connection_id = %self.conn.id(), error = %e, "closing session");
            let _ = self.control.send(Frame::close(e.close_code(), &e.to_string())).await;
        }
        // Dropping `self.control` here lets the writer finish.
        result
    }

    async fn read_loop(&mut self, stop: &CancellationToken) -> Result<(), EngineError> {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                read = self.io.read(&mut buf) => read?,
            };
            if n == 0 {
                debug!(connection_id = %self.conn.id(), "transport closed by peer");
                return Ok(());
            }
            self.decoder.extend(&buf[..n]);

            while let Some(frame) = self.decoder.next_frame()? {
                if let Flow::Closed = self.on_frame(frame).await? {
                    return Ok(());
                }
            }
        }
    }

    async fn on_frame(&mut self, frame: Frame) -> Result<Flow, EngineError> {
        if self.require_masked && !frame.is_masked() {
            return Err(EngineError::Protocol("client frames must be masked"));
        }
        if frame.rsv1 && (self.inflater.is_none() || frame.is_control()) {
            return Err(EngineError::Protocol("unexpected RSV1 bit"));
        }
        self.conn.update_ping_time();

        let Some(message) = self.reassembler.push(frame)? else {
            return Ok(Flow::Continue);
        };

        match message.opcode {
            Opcode::Ping => {
                let _ = self.control.send(Frame::pong(message.payload)).await;
                Ok(Flow::Continue)
            }
            Opcode::Pong => Ok(Flow::Continue),
            Opcode::Close => {
                let received = Frame::new(Opcode::Close, message.payload);
                let echo = match received.close_code() {
                    Some(code) if close_code::is_valid(code) => Frame::close(code, ""),
                    None if received.payload.is_empty() => Frame::new(Opcode::Close, Vec::new()),
                    // Reserved code or a 1-byte body.
                    _ => {
                        self.server.metrics().protocol_error();
                        Frame::close(close_code::PROTOCOL_ERROR, "")
                    }
                };
                debug!(connection_id = %self.conn.id(), code = ?received.close_code(), "close received");
                let _ = self.control.send(echo).await;
                Ok(Flow::Closed)
            }
            Opcode::Text | Opcode::Binary => {
                self.dispatch(message).await?;
                Ok(Flow::Continue)
            }
            Opcode::Continuation => Ok(Flow::Continue),
        }
    }

    async fn dispatch(&mut self, assembled: AssembledMessage) -> Result<(), EngineError> {
        let payload = match (&mut self.inflater, assembled.compressed) {
            (Some(inflater), true) => inflater.decompress(&assembled.payload)?,
            _ => assembled.payload,
        };
        let message = match assembled.opcode {
            Opcode::Text => {
                Message::text(String::from_utf8(payload).map_err(|_| EngineError::InvalidUtf8)?)
            }
            _ => Message::binary(payload),
        };

        // Handler failures are per-message: logged and counted by the server,
        // the session carries on.
        let _ = self
            .server
            .handle_message(Arc::clone(&self.conn), Arc::new(message))
            .await;
        Ok(())
    }
}

struct Writer<W> {
    server: Arc<Server>,
    conn: Arc<Connection>,
    io: W,
    control: mpsc::Receiver<Frame>,
    outbound: mpsc::Receiver<Arc<Message>>,
    deflater: Option<CompressionContext>,
    max_frame_size: usize,
}

impl<S: AsyncWrite> Writer<WriteHalf<S>> {
    async fn run(mut self, done: CancellationToken) -> Result<(), EngineError> {
        let result = self.write_loop().await;
        if let Err(e) = &result {
            warn!(connection_id = %self.conn.id(), error = %e, "session writer failed");
        }
        let _ = self.io.shutdown().await;
        done.cancel();
        result
    }

    async fn write_loop(&mut self) -> Result<(), EngineError> {
        let period = self.server.config().heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let cancelled = self.conn.cancellation().clone();

        loop {
            tokio::select! {
                biased;

                frame = self.control.recv() => match frame {
                    Some(frame) => {
                        let closing = frame.opcode == Opcode::Close;
                        self.write_frame(&frame).await?;
                        if closing {
                            return Ok(());
                        }
                    }
                    // Reader finished without a close to send.
                    None => {
                        if cancelled.is_cancelled() {
                            self.write_frame(&Frame::close(close_code::GOING_AWAY, "")).await?;
                        }
                        return Ok(());
                    }
                },
                _ = cancelled.cancelled() => {
                    self.write_frame(&Frame::close(close_code::GOING_AWAY, "")).await?;
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    self.write_frame(&Frame::ping(Vec::new())).await?;
                }
                Some(message) = self.outbound.recv() => {
                    self.write_message(&message).await?;
                }
            }
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<(), EngineError> {
        self.io.write_all(&encode(frame)?).await?;
        self.io.flush().await?;
        Ok(())
    }

    async fn write_message(&mut self, message: &Message) -> Result<(), EngineError> {
        let opcode = match message.kind() {
            MessageKind::Text => Opcode::Text,
            MessageKind::Binary => Opcode::Binary,
        };
        let compressed = self
            .deflater
            .as_mut()
            .map(|deflater| deflater.compress(message.payload()));
        let (payload, rsv1) = match &compressed {
            Some(c) => (c.as_bytes(), c.is_compressed()),
            None => (message.payload(), false),
        };

        let mut out = Vec::with_capacity(payload.len() + 14);
        for frame in fragment_message(opcode, payload, rsv1, self.max_frame_size) {
            encode_into(&frame, &mut out)?;
        }
        self.io.write_all(&out).await?;
        self.io.flush().await?;
        self.server.metrics().message_sent(message.payload().len());
        Ok(())
    }
}

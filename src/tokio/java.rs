use std::time::Instant;

use async_trait::async_trait;

use crate::{
    java::{JavaSession, JavaStatusResponse},
    tokio::{
        transport::{AsyncStreamTransport, TokioTcpTransport},
        AsyncPingable,
    },
    transport::deadline_after,
    Error, Java,
};

#[async_trait]
impl AsyncPingable for Java {
    type Response = JavaStatusResponse;

    async fn ping(self) -> Result<Self::Response, Error> {
        let deadline = deadline_after(self.timeout);
        let mut transport = TokioTcpTransport::connect(&self.address, deadline).await?;
        let mut session = self.session();
        let result = exchange(&mut transport, &mut session, deadline).await;
        transport.close().await;
        result
    }
}

/// Runs a session to completion over a suspending stream.
pub async fn exchange<T>(
    transport: &mut T,
    session: &mut JavaSession,
    deadline: Instant,
) -> Result<JavaStatusResponse, Error>
where
    T: AsyncStreamTransport + ?Sized,
{
    loop {
        while let Some((stage, packet)) = session.poll_transmit(Instant::now()) {
            transport.send_packet(&packet, deadline, stage).await?;
        }
        if let Some(status) = session.take_response() {
            return Ok(status);
        }
        let packet = transport.receive_packet(deadline, session.stage()).await?;
        session.handle(packet, Instant::now())?;
    }
}

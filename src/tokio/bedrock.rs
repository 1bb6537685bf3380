use std::time::Instant;

use async_trait::async_trait;

use crate::{
    bedrock::{BedrockSession, BedrockStatusResponse},
    tokio::{
        transport::{AsyncDatagramTransport, TokioUdpTransport},
        AsyncPingable,
    },
    transport::{deadline_after, MAX_DATAGRAM_SIZE},
    Bedrock, Error,
};

#[async_trait]
impl AsyncPingable for Bedrock {
    type Response = BedrockStatusResponse;

    async fn ping(self) -> Result<Self::Response, Error> {
        let deadline = deadline_after(self.timeout);
        let mut transport = TokioUdpTransport::connect(&self.address, deadline).await?;
        let mut session = self.session();
        exchange(&mut transport, &mut session, deadline).await
    }
}

/// Runs a session to completion over a suspending datagram socket.
pub async fn exchange<T>(
    transport: &mut T,
    session: &mut BedrockSession,
    deadline: Instant,
) -> Result<BedrockStatusResponse, Error>
where
    T: AsyncDatagramTransport + ?Sized,
{
    loop {
        while let Some((stage, datagram)) = session.poll_transmit(Instant::now()) {
            transport.send(&datagram, deadline, stage).await?;
        }
        if let Some(response) = session.take_response() {
            return Ok(response);
        }
        let datagram = transport
            .receive(MAX_DATAGRAM_SIZE, deadline, session.stage())
            .await?;
        session.handle(&datagram, Instant::now())?;
    }
}

use std::time::Instant;

use async_trait::async_trait;

use crate::{
    legacy::{LegacySession, LegacyStatusResponse},
    tokio::{
        transport::{AsyncStreamTransport, TokioTcpTransport},
        AsyncPingable,
    },
    transport::deadline_after,
    Error, Legacy,
};

#[async_trait]
impl AsyncPingable for Legacy {
    type Response = LegacyStatusResponse;

    async fn ping(self) -> Result<Self::Response, Error> {
        let mut session = self.session()?;
        let deadline = deadline_after(self.timeout);
        let mut transport = TokioTcpTransport::connect(&self.address, deadline).await?;
        let result = exchange(&mut transport, &mut session, deadline).await;
        transport.close().await;
        result
    }
}

/// Runs a session to completion over a suspending stream.
pub async fn exchange<T>(
    transport: &mut T,
    session: &mut LegacySession,
    deadline: Instant,
) -> Result<LegacyStatusResponse, Error>
where
    T: AsyncStreamTransport + ?Sized,
{
    loop {
        while let Some((stage, bytes)) = session.poll_transmit(Instant::now()) {
            transport.write_all(&bytes, deadline, stage).await?;
        }
        if let Some(response) = session.take_response() {
            return Ok(response);
        }
        let bytes = transport
            .read_exact(session.bytes_wanted(), deadline, session.stage())
            .await?;
        session.handle(&bytes, Instant::now())?;
    }
}

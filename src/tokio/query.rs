use std::time::Instant;

use async_trait::async_trait;

use crate::{
    query::{BasicStat, FullStat, QueryBasicResponse, QueryResponse, QuerySession, StatKind},
    tokio::{
        transport::{AsyncDatagramTransport, TokioUdpTransport},
        AsyncPingable,
    },
    transport::{deadline_after, MAX_DATAGRAM_SIZE},
    Error, Query,
};

#[async_trait]
impl AsyncPingable for Query {
    type Response = QueryResponse;

    async fn ping(self) -> Result<Self::Response, Error> {
        full_stat(&self).await
    }
}

/// Requests the full stat.
pub async fn full_stat(query: &Query) -> Result<QueryResponse, Error> {
    run(query, QuerySession::<FullStat>::random()).await
}

/// Requests the basic stat.
pub async fn basic_stat(query: &Query) -> Result<QueryBasicResponse, Error> {
    run(query, QuerySession::<BasicStat>::random()).await
}

async fn run<K>(query: &Query, mut session: QuerySession<K>) -> Result<K::Response, Error>
where
    K: StatKind + Send,
    K::Response: Send,
{
    let deadline = deadline_after(query.timeout);
    let mut transport = TokioUdpTransport::connect(&query.address, deadline).await?;
    exchange(&mut transport, &mut session, deadline).await
}

/// Runs a session to completion over a suspending datagram socket.
pub async fn exchange<T, K>(
    transport: &mut T,
    session: &mut QuerySession<K>,
    deadline: Instant,
) -> Result<K::Response, Error>
where
    T: AsyncDatagramTransport + ?Sized,
    K: StatKind,
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

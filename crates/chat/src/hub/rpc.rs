// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gRPC delivery surface: `skein.v1.ChatDelivery`.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use skein_core::error::ErrorCode;

use crate::proto;

use super::ChatHub;

pub struct DeliveryService {
    hub: Arc<ChatHub>,
}

impl DeliveryService {
    pub fn new(hub: Arc<ChatHub>) -> Self {
        Self { hub }
    }
}

#[tonic::async_trait]
impl proto::chat_delivery_server::ChatDelivery for DeliveryService {
    async fn deliver(
        &self,
        request: Request<proto::DeliverRequest>,
    ) -> Result<Response<proto::DeliverResponse>, Status> {
        let req = request.into_inner();
        if req.room_id.is_empty() || req.session_id.is_empty() {
            return Err(ErrorCode::BadRequest.to_grpc_status("room_id and session_id required"));
        }

        let delivered = self
            .hub
            .roster
            .deliver(&req.room_id, &req.session_id, req.message_json, None)
            .await;
        debug!(
            room_id = %req.room_id,
            session_id = %req.session_id,
            delivered,
            "delivery fan-out"
        );
        Ok(Response::new(proto::DeliverResponse { delivered: delivered as i32 }))
    }
}

/// Serve the delivery RPC until shutdown.
pub async fn serve(
    hub: Arc<ChatHub>,
    addr: std::net::SocketAddr,
    shutdown: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    let service = proto::chat_delivery_server::ChatDeliveryServer::new(DeliveryService::new(hub));
    tonic::transport::Server::builder()
        .add_service(service)
        .serve_with_shutdown(addr, shutdown.cancelled_owned())
        .await?;
    Ok(())
}

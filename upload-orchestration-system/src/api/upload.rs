use actix_easy_multipart::MultipartForm;
use actix_web::{get, post, web};
use domain_upload::{
    command::{StartUploadCommand, UploadChunkCommand},
    model::vo::{CancelOutcome, ChunkReceipt, UploadProgress},
};

use super::{
    dtos::{CompleteUploadResponse, SessionRequest, StartUploadResponse, UploadChunkRequest},
    session_key, ApiError, ApiResponder, ApiResult,
};
use crate::infrastructure::ServiceProvider;

#[post("video-upload/StartUpload")]
pub async fn start_upload(
    sp: web::Data<ServiceProvider>,
    data: web::Json<StartUploadCommand>,
) -> ApiResult<StartUploadResponse> {
    let started = sp.upload_service.start_upload(data.0).await?;
    Ok(ApiResponder(started.into()))
}

#[post("video-upload/UploadChunk")]
pub async fn upload_chunk(
    sp: web::Data<ServiceProvider>,
    data: MultipartForm<UploadChunkRequest>,
) -> ApiResult<ChunkReceipt> {
    let data = data.0;
    let content = match data.bin.as_slice() {
        [content] => content,
        [] => return Err(ApiError::invalid("Chunk is empty.")),
        _ => return Err(ApiError::invalid("Can't upload more than one chunk at a time.")),
    };
    let payload = tokio::fs::read(content.file.path())
        .await
        .map_err(|e| ApiError::invalid(format!("Unreadable chunk: {e}")))?;
    let receipt = sp
        .upload_service
        .upload_chunk(UploadChunkCommand {
            key: session_key(data.owner_id.0, &data.session_id.0)?,
            chunk_number: data.chunk_number.0,
            payload,
            checksum: data.chunk_checksum.0,
        })
        .await?;
    Ok(ApiResponder(receipt))
}

#[post("video-upload/CompleteUpload")]
pub async fn complete_upload(
    sp: web::Data<ServiceProvider>,
    data: web::Json<SessionRequest>,
) -> ApiResult<CompleteUploadResponse> {
    let key = session_key(data.owner_id, &data.session_id)?;
    let completed = sp.upload_service.complete_upload(&key).await?;
    Ok(ApiResponder(completed.into()))
}

#[post("video-upload/CancelUpload")]
pub async fn cancel_upload(
    sp: web::Data<ServiceProvider>,
    data: web::Json<SessionRequest>,
) -> ApiResult<CancelOutcome> {
    let key = session_key(data.owner_id, &data.session_id)?;
    Ok(ApiResponder(sp.upload_service.cancel_upload(&key).await?))
}

#[get("video-upload/UploadProgress/{owner_id}/{session_id}")]
pub async fn get_upload_progress(
    sp: web::Data<ServiceProvider>,
    path: web::Path<(i64, String)>,
) -> ApiResult<UploadProgress> {
    let (owner_id, session_id) = path.into_inner();
    let key = session_key(owner_id, &session_id)?;
    Ok(ApiResponder(sp.upload_service.get_upload_progress(&key).await?))
}

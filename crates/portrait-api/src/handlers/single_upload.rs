//! Single image upload, either as a file or as a source URL.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::HeaderMap,
    response::Response,
};
use chrono::NaiveDate;

use crate::error::{see_other, FormError, StatusMessage};
use crate::handlers::{upload_context, SINGLE_UPLOAD_PATH};
use crate::services::{Acquired, DirectUploadForm, StoredUpload};
use crate::state::AppState;

#[derive(Debug, Default)]
struct SingleUploadFields {
    file: Option<(Bytes, Option<String>)>,
    source_url: Option<String>,
    wikidata_entity_id: String,
    name: Option<String>,
    recorded_date: Option<String>,
}

async fn read_fields(mut multipart: Multipart) -> Result<SingleUploadFields, FormError> {
    let mut fields = SingleUploadFields::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        FormError::message(format!("Failed to read form: {}", e), SINGLE_UPLOAD_PATH)
    })? {
        let field_name = field.name().map(str::to_string).unwrap_or_default();

        if field_name == "file" {
            let filename = field.file_name().map(str::to_string);
            let data = field.bytes().await.map_err(|e| {
                FormError::message(format!("Failed to read file data: {}", e), SINGLE_UPLOAD_PATH)
            })?;
            // Browsers send an empty part when no file was chosen.
            if !data.is_empty() {
                fields.file = Some((data, filename));
            }
            continue;
        }

        let value = field.text().await.map_err(|e| {
            FormError::message(format!("Failed to read form: {}", e), SINGLE_UPLOAD_PATH)
        })?;
        let value = value.trim().to_string();
        let value = (!value.is_empty()).then_some(value);

        match field_name.as_str() {
            "sourceUrl" => fields.source_url = value,
            "wikidataEntityId" => fields.wikidata_entity_id = value.unwrap_or_default(),
            "name" => fields.name = value,
            "recordedDate" => fields.recorded_date = value,
            other => tracing::debug!(field = %other, "Ignoring unknown form field"),
        }
    }

    Ok(fields)
}

fn parse_recorded_date(value: Option<&str>) -> Result<Option<NaiveDate>, FormError> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(|_| {
                FormError::message(
                    format!("The recorded date {} is invalid.", v),
                    SINGLE_UPLOAD_PATH,
                )
            })
        })
        .transpose()
}

fn uploaded(acquired: &Acquired) -> Response {
    let subject = acquired
        .asset
        .wikidata_label
        .clone()
        .or_else(|| acquired.asset.wikidata_entity.map(|e| format!("Q{}", e)))
        .unwrap_or_default();
    see_other(
        SINGLE_UPLOAD_PATH,
        StatusMessage::success(format!(
            "File was uploaded successfully. Photo of {} was saved and entered into the Database.",
            subject
        )),
    )
}

/// `POST /image/single_upload`
#[tracing::instrument(skip(state, headers, multipart), fields(operation = "single_upload"))]
pub async fn single_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, FormError> {
    let ctx = upload_context(&headers);
    let fields = read_fields(multipart).await?;
    let form = DirectUploadForm {
        wikidata_entity_id: fields.wikidata_entity_id,
        name: fields.name,
        recorded_date: parse_recorded_date(fields.recorded_date.as_deref())?,
    };

    let result = if let Some((data, original_filename)) = fields.file {
        let provisional = state
            .store
            .write_provisional(&data)
            .await
            .map_err(|e| FormError::new(e, SINGLE_UPLOAD_PATH))?;
        let upload = StoredUpload {
            provisional,
            original_filename,
        };
        state.acquisition.upload_file(&ctx, upload, form).await
    } else if let Some(url) = fields.source_url {
        state.acquisition.upload_from_url(&ctx, &url, form).await
    } else {
        return Err(FormError::message("No File is given.", SINGLE_UPLOAD_PATH));
    };
    let acquired = result.map_err(|e| FormError::new(e, SINGLE_UPLOAD_PATH))?;

    Ok(uploaded(&acquired))
}

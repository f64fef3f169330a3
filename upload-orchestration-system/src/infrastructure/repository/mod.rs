mod chunk_tracker;
mod upload_session;

use domain_upload::model::entity::SessionKey;

// Both keys of a session share one hash tag so their scripts stay on one cluster slot.
fn session_key(key: &SessionKey) -> String {
    format!("upload_session:{{{}}}", key.tag())
}

fn chunks_key(key: &SessionKey) -> String {
    format!("upload_chunks:{{{}}}", key.tag())
}

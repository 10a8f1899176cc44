use crate::providers::{ClientError, EmailTransport};
use async_trait::async_trait;
use aws_sdk_sesv2::error::DisplayErrorContext;
use aws_sdk_sesv2::primitives::Blob;
use aws_sdk_sesv2::types::{Destination, EmailContent, RawMessage};
use aws_sdk_sesv2::Client;

pub struct SesTransport {
    client: Client,
    from: String,
    to: Vec<String>,
}

impl SesTransport {
    pub fn new(client: Client, from: impl Into<String>, to: Vec<String>) -> Self {
        Self {
            client,
            from: from.into(),
            to,
        }
    }
}

#[async_trait]
impl EmailTransport for SesTransport {
    async fn send(&self, raw_message: Vec<u8>) -> Result<Option<String>, ClientError> {
        let raw = RawMessage::builder()
            .data(Blob::new(raw_message))
            .build()
            .map_err(|e| ClientError::new(e.to_string()))?;

        let output = self
            .client
            .send_email()
            .from_email_address(&self.from)
            .destination(
                Destination::builder()
                    .set_to_addresses(Some(self.to.clone()))
                    .build(),
            )
            .content(EmailContent::builder().raw(raw).build())
            .send()
            .await
            .map_err(|e| ClientError::new(DisplayErrorContext(&e).to_string()))?;

        Ok(output.message_id().map(ToString::to_string))
    }
}

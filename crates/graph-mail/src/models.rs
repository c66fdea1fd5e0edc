//! Graph resource shapes
//!
//! Only the fields the facade selects. Graph omits unselected and null
//! properties, so everything is optional.

use serde::{Deserialize, Serialize};

/// Signed-in user profile (`/me`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub display_name: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
}

impl User {
    /// Mail address, or the principal name for accounts without a mailbox address.
    pub fn email(&self) -> Option<&str> {
        self.mail
            .as_deref()
            .or(self.user_principal_name.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EmailAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: Option<EmailAddress>,
}

/// Inbox message summary.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub subject: Option<String>,
    pub from: Option<Recipient>,
    pub is_read: Option<bool>,
    /// ISO 8601 timestamp as sent by Graph
    pub received_date_time: Option<String>,
}

impl Message {
    pub fn sender_name(&self) -> Option<&str> {
        self.from
            .as_ref()?
            .email_address
            .as_ref()?
            .name
            .as_deref()
    }
}

/// One page of a message collection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub value: Vec<Message>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// Body of `POST /me/sendMail`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendMailRequest {
    pub message: OutgoingMessage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutgoingMessage {
    pub subject: String,
    pub body: ItemBody,
    pub to_recipients: Vec<Recipient>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ItemBody {
    pub content_type: &'static str,
    pub content: String,
}

impl SendMailRequest {
    /// Plain-text mail to a single recipient.
    pub(crate) fn plain_text(subject: &str, body: &str, recipient: &str) -> Self {
        Self {
            message: OutgoingMessage {
                subject: subject.to_owned(),
                body: ItemBody {
                    content_type: "Text",
                    content: body.to_owned(),
                },
                to_recipients: vec![Recipient {
                    email_address: Some(EmailAddress {
                        name: None,
                        address: Some(recipient.to_owned()),
                    }),
                }],
            },
        }
    }
}

/// OData error envelope: `{"error":{"code":"...","message":"..."}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ODataErrorBody {
    pub error: ODataError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ODataError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_email_falls_back_to_principal_name() {
        let user: User = serde_json::from_str(
            r#"{"displayName":"Adele Vance","mail":null,"userPrincipalName":"adelev@contoso.com"}"#,
        )
        .unwrap();
        assert_eq!(user.email(), Some("adelev@contoso.com"));

        let user: User = serde_json::from_str(
            r#"{"displayName":"Adele Vance","mail":"adele@contoso.com","userPrincipalName":"adelev@contoso.com"}"#,
        )
        .unwrap();
        assert_eq!(user.email(), Some("adele@contoso.com"));
    }

    #[test]
    fn message_page_parses_graph_payload() {
        let page: MessagePage = serde_json::from_str(
            r#"{
                "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#users('me')/mailFolders('inbox')/messages(from,isRead,receivedDateTime,subject)",
                "@odata.nextLink": "https://graph.microsoft.com/v1.0/me/mailFolders/inbox/messages?$skip=25",
                "value": [
                    {
                        "@odata.etag": "W/\"abc\"",
                        "id": "AAMk1",
                        "receivedDateTime": "2024-05-01T09:30:00Z",
                        "subject": "Quarterly review",
                        "isRead": false,
                        "from": {"emailAddress": {
                            "name": "Megan Bowen",
                            "address": "meganb@contoso.com"
                        }}
                    },
                    {"id": "AAMk2", "subject": "No sender", "isRead": true}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(page.value.len(), 2);
        assert_eq!(page.value[0].sender_name(), Some("Megan Bowen"));
        assert_eq!(page.value[0].is_read, Some(false));
        assert_eq!(page.value[1].sender_name(), None);
        assert!(page.next_link.is_some());
    }

    #[test]
    fn send_mail_request_matches_graph_shape() {
        let request = SendMailRequest::plain_text("Hi", "Hello there", "alex@contoso.com");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "message": {
                    "subject": "Hi",
                    "body": {"contentType": "Text", "content": "Hello there"},
                    "toRecipients": [{"emailAddress": {"address": "alex@contoso.com"}}]
                }
            })
        );
    }
}

use futures::future::BoxFuture;

use super::diagnostics::Diagnostic;
use super::types::Value;

/// One entry of a selectable option list produced by a data source or a
/// static `possibleValues` block.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectableItem {
    pub label: String,
    pub value: Value,
    pub group: Option<String>,
}

impl SelectableItem {
    pub fn new(label: &str, value: Value) -> SelectableItem {
        SelectableItem { label: label.to_string(), value, group: None }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }
}

/// Request for one decision from the operator. The engine never renders UI;
/// it hands this to the host's [InputPrompter] and awaits the answer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptRequest {
    /// Id of the input descriptor this request resolves.
    pub input_id: String,
    /// Operator facing title, when the descriptor carries one.
    pub title: Option<String>,
    pub request_type: PromptRequestType,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PromptRequestType {
    /// Pick exactly one item from a candidate list (select/radio style modes).
    PickOption(PickOptionRequest),
    /// Provide a free-form value; `secure` hints at masked entry.
    ProvideValue(ProvideValueRequest),
    /// Review a value the engine computed; the answer may override it.
    ReviewValue(ReviewValueRequest),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickOptionRequest {
    pub items: Vec<SelectableItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvideValueRequest {
    pub proposed: Option<Value>,
    pub secure: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewValueRequest {
    pub proposed: Value,
}

/// Host-supplied callback for inputs that need a human decision. Resolution
/// of the requesting input suspends until the returned future completes.
pub trait InputPrompter: Send + Sync {
    fn prompt(&self, request: PromptRequest) -> BoxFuture<'_, Result<Value, Diagnostic>>;
}

/// [InputPrompter] bridging to a console or UI loop over crossbeam channels:
/// each request is sent together with a one-shot reply sender.
pub struct ChannelPrompter {
    request_tx: crossbeam_channel::Sender<(PromptRequest, crossbeam_channel::Sender<Result<Value, Diagnostic>>)>,
}

impl ChannelPrompter {
    pub fn new() -> (
        ChannelPrompter,
        crossbeam_channel::Receiver<(PromptRequest, crossbeam_channel::Sender<Result<Value, Diagnostic>>)>,
    ) {
        let (request_tx, request_rx) = crossbeam_channel::unbounded();
        (ChannelPrompter { request_tx }, request_rx)
    }
}

impl InputPrompter for ChannelPrompter {
    fn prompt(&self, request: PromptRequest) -> BoxFuture<'_, Result<Value, Diagnostic>> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let sent = self.request_tx.send((request, reply_tx));
        Box::pin(async move {
            sent.map_err(|_| Diagnostic::error("prompt channel closed before request was sent"))?;
            reply_rx
                .recv()
                .map_err(|_| Diagnostic::error("prompt channel closed before a reply was sent"))?
        })
    }
}

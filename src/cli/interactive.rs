//! Interactive prompt loop over one connection.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::client::{build_request, ClientError, RelayClient};
use crate::protocol::Mode;

/// Read mode and text from `input` until `exit` or end of input, printing each
/// response to `output` as indented JSON.
pub async fn interactive<R, W>(
    client: &mut RelayClient,
    input: R,
    mut output: W,
) -> Result<(), ClientError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output
        .write_all(b"Interactive mode. Type 'exit' to quit.\n\n")
        .await?;

    loop {
        output.write_all(b"Choose mode (calc/gpt/exit): ").await?;
        output.flush().await?;
        let Some(choice) = lines.next_line().await? else {
            break;
        };
        let choice = choice.trim();
        if choice == "exit" {
            output.write_all(b"Closing connection. Bye!\n").await?;
            break;
        }
        let Some(mode) = Mode::parse(choice) else {
            output.write_all(b"Invalid mode\n\n").await?;
            continue;
        };

        let question: &[u8] = match mode {
            Mode::Calc => b"Enter expression to calculate: ",
            Mode::Gpt => b"Enter prompt: ",
        };
        output.write_all(question).await?;
        output.flush().await?;
        let Some(text) = lines.next_line().await? else {
            break;
        };

        let response = client.request(&build_request(mode, text.trim(), true)).await?;
        let pretty = serde_json::to_string_pretty(&response)?;
        output
            .write_all(format!("\nResult:\n{}\n\n", pretty).as_bytes())
            .await?;
    }

    output.flush().await?;
    Ok(())
}

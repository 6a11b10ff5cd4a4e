//! Spreadsheet editing through the host's `excel.*` operations.

use serde_json::{Value, json};

use researchkit_shared::{Placement, ResearchError, Result};

use crate::response::{decode, field_or_raw};
use crate::transport::HostTransport;

/// Workbook operations. File paths are passed to the host as given.
#[derive(Clone)]
pub struct Spreadsheet<T> {
    transport: T,
}

fn s(value: &str) -> Value {
    Value::String(value.to_string())
}

fn placement(p: &Placement) -> Value {
    json!({
        "left": p.left,
        "top": p.top,
        "width": p.width,
        "height": p.height,
    })
}

impl<T: HostTransport> Spreadsheet<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn sheet_names(&self, file: &str) -> Result<Vec<String>> {
        let op = "excel.getSheetNames";
        let raw = self.transport.invoke(op, vec![s(file)]).await?;
        decode(op, &raw)
    }

    pub async fn read_cell(&self, file: &str, sheet: &str, cell: &str) -> Result<String> {
        let raw = self
            .transport
            .invoke("excel.readCell", vec![s(file), s(sheet), s(cell)])
            .await?;
        Ok(field_or_raw(&raw, "value"))
    }

    /// Cell values of `range` as rows.
    pub async fn read_range(&self, file: &str, sheet: &str, range: &str) -> Result<Value> {
        let op = "excel.readRange";
        let raw = self
            .transport
            .invoke(op, vec![s(file), s(sheet), s(range)])
            .await?;
        decode(op, &raw)
    }

    pub async fn create_workbook(&self, file: &str) -> Result<()> {
        self.transport
            .invoke("excel.createWorkbook", vec![s(file)])
            .await?;
        Ok(())
    }

    pub async fn write_cell(&self, file: &str, sheet: &str, cell: &str, value: &str) -> Result<()> {
        self.transport
            .invoke("excel.writeCell", vec![s(file), s(sheet), s(cell), s(value)])
            .await?;
        Ok(())
    }

    /// Write a block of rows starting at `start`. Rows travel JSON-encoded.
    pub async fn write_range(
        &self,
        file: &str,
        sheet: &str,
        start: &str,
        rows: &[Vec<Value>],
    ) -> Result<()> {
        let encoded = serde_json::to_string(rows)
            .map_err(|e| ResearchError::parse(e.to_string()))?;
        self.transport
            .invoke(
                "excel.writeRange",
                vec![s(file), s(sheet), s(start), Value::String(encoded)],
            )
            .await?;
        Ok(())
    }

    pub async fn add_sheet(&self, file: &str, sheet: &str) -> Result<()> {
        self.transport
            .invoke("excel.addSheet", vec![s(file), s(sheet)])
            .await?;
        Ok(())
    }

    pub async fn open_in_app(&self, file: &str) -> Result<()> {
        self.transport
            .invoke("excel.openInApp", vec![s(file)])
            .await?;
        Ok(())
    }

    pub async fn set_column_width(
        &self,
        file: &str,
        sheet: &str,
        columns: &str,
        width: f64,
    ) -> Result<()> {
        self.transport
            .invoke(
                "excel.setColumnWidth",
                vec![s(file), s(sheet), s(columns), s(&width.to_string())],
            )
            .await?;
        Ok(())
    }

    pub async fn set_row_height(&self, file: &str, sheet: &str, rows: &str, height: f64) -> Result<()> {
        self.transport
            .invoke(
                "excel.setRowHeight",
                vec![s(file), s(sheet), s(rows), s(&height.to_string())],
            )
            .await?;
        Ok(())
    }

    /// Decode `base64` and write it to `file` on the host side.
    pub async fn save_base64_image(&self, file: &str, base64: &str) -> Result<()> {
        self.transport
            .invoke("excel.saveBase64Image", vec![s(file), s(base64)])
            .await?;
        Ok(())
    }

    pub async fn create_chart(
        &self,
        file: &str,
        sheet: &str,
        range: &str,
        chart_type: &str,
        title: &str,
        at: &Placement,
    ) -> Result<()> {
        self.transport
            .invoke(
                "excel.createChart",
                vec![
                    s(file),
                    s(sheet),
                    s(range),
                    s(chart_type),
                    s(title),
                    placement(at),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn insert_picture(
        &self,
        file: &str,
        sheet: &str,
        image: &str,
        at: &Placement,
    ) -> Result<()> {
        self.transport
            .invoke(
                "excel.insertPicture",
                vec![s(file), s(sheet), s(image), placement(at)],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedTransport;

    #[tokio::test]
    async fn write_range_sends_json_rows() {
        let host = ScriptedTransport::new();
        let sheet = Spreadsheet::new(host.clone());
        let rows = vec![
            vec![json!("Browser"), json!("Stars"), json!("Forks")],
            vec![json!("Floorp"), json!(6200), json!(150)],
        ];

        sheet
            .write_range("out.xlsx", "Sheet1", "A1", &rows)
            .await
            .unwrap();

        let call = &host.calls_to("excel.writeRange")[0];
        assert_eq!(call.args[3], json!(r#"[["Browser","Stars","Forks"],["Floorp",6200,150]]"#));
    }

    #[tokio::test]
    async fn chart_placement_is_an_options_object() {
        let host = ScriptedTransport::new();
        let sheet = Spreadsheet::new(host.clone());
        let at = Placement {
            left: 300.0,
            top: 50.0,
            width: 800.0,
            height: 450.0,
        };

        sheet
            .create_chart("out.xlsx", "Sheet1", "A1:C8", "column", "Browser Popularity", &at)
            .await
            .unwrap();

        let call = &host.calls_to("excel.createChart")[0];
        assert_eq!(call.args[5]["width"], json!(800.0));
        assert_eq!(call.args[4], json!("Browser Popularity"));
    }

    #[tokio::test]
    async fn sheet_names_decoded() {
        let host = ScriptedTransport::new();
        host.respond("excel.getSheetNames", r#"["Sheet1","Summary"]"#);
        let sheet = Spreadsheet::new(host);
        assert_eq!(
            sheet.sheet_names("a.xlsx").await.unwrap(),
            vec!["Sheet1".to_string(), "Summary".to_string()]
        );
    }
}

use crate::errors::{AppError, AppResult};
use crate::models::{SidebarChat, SidebarNode};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const SIDEBAR_TREE_KEY: &str = "sidebar-tree";
const CONVERSATION_ID_KEY: &str = "conversation-id";

/// Key-value store for the persisted local state: the sidebar tree and the
/// current conversation id, both serialized as JSON under fixed keys.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn get_value(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        let value = conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_value(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO app_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn load_conversation_id(&self) -> AppResult<Option<String>> {
        self.get_value(CONVERSATION_ID_KEY)
    }

    pub fn save_conversation_id(&self, id: &str) -> AppResult<()> {
        self.set_value(CONVERSATION_ID_KEY, id)
    }

    pub fn load_sidebar(&self) -> AppResult<Vec<SidebarNode>> {
        match self.get_value(SIDEBAR_TREE_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    pub fn save_sidebar(&self, nodes: &[SidebarNode]) -> AppResult<()> {
        self.set_value(SIDEBAR_TREE_KEY, &serde_json::to_string(nodes)?)
    }

    pub fn add_chat(&self, title: &str, conversation_id: Option<&str>) -> AppResult<SidebarChat> {
        let chat = SidebarChat {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            conversation_id: conversation_id.map(ToString::to_string),
        };
        let mut nodes = self.load_sidebar()?;
        nodes.push(SidebarNode::Chat(chat.clone()));
        self.save_sidebar(&nodes)?;
        Ok(chat)
    }

    pub fn add_folder(&self, name: &str) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        let mut nodes = self.load_sidebar()?;
        nodes.push(SidebarNode::Folder {
            id: id.clone(),
            name: name.to_string(),
            chats: Vec::new(),
        });
        self.save_sidebar(&nodes)?;
        Ok(id)
    }

    /// Moves a top-level chat leaf into a folder, preserving order.
    pub fn move_chat_to_folder(&self, chat_id: &str, folder_id: &str) -> AppResult<()> {
        let mut nodes = self.load_sidebar()?;

        let position = nodes
            .iter()
            .position(|node| matches!(node, SidebarNode::Chat(chat) if chat.id == chat_id))
            .ok_or_else(|| AppError::NotFound(format!("no chat with id {}", chat_id)))?;
        let SidebarNode::Chat(chat) = nodes.remove(position) else {
            return Err(AppError::Internal("sidebar node changed type".to_string()));
        };

        let folder = nodes
            .iter_mut()
            .find_map(|node| match node {
                SidebarNode::Folder { id, chats, .. } if id == folder_id => Some(chats),
                _ => None,
            })
            .ok_or_else(|| AppError::NotFound(format!("no folder with id {}", folder_id)))?;
        folder.push(chat);

        self.save_sidebar(&nodes)
    }

    pub fn rename_node(&self, node_id: &str, new_title: &str) -> AppResult<bool> {
        let mut nodes = self.load_sidebar()?;
        let mut renamed = false;
        for node in &mut nodes {
            match node {
                SidebarNode::Chat(chat) if chat.id == node_id => {
                    chat.title = new_title.to_string();
                    renamed = true;
                }
                SidebarNode::Folder { id, name, chats } => {
                    if id == node_id {
                        *name = new_title.to_string();
                        renamed = true;
                    }
                    for chat in chats {
                        if chat.id == node_id {
                            chat.title = new_title.to_string();
                            renamed = true;
                        }
                    }
                }
                _ => {}
            }
        }
        if renamed {
            self.save_sidebar(&nodes)?;
        }
        Ok(renamed)
    }

    /// Deletes a chat or a folder (with its chats), wherever it sits.
    pub fn delete_node(&self, node_id: &str) -> AppResult<bool> {
        let mut nodes = self.load_sidebar()?;
        let before = nodes.len();
        nodes.retain(|node| node.id() != node_id);
        let mut deleted = nodes.len() != before;
        for node in &mut nodes {
            if let SidebarNode::Folder { chats, .. } = node {
                let count = chats.len();
                chats.retain(|chat| chat.id != node_id);
                deleted |= chats.len() != count;
            }
        }
        if deleted {
            self.save_sidebar(&nodes)?;
        }
        Ok(deleted)
    }
}

use libc::{c_char, c_double, c_int, c_long, c_void};

use crate::*;

extern "C" {
    // Instantiation
    pub fn csoundInitialize(flags: c_int) -> c_int;
    pub fn csoundCreate(hostData: *mut c_void) -> *mut CSOUND;
    pub fn csoundDestroy(csound: *mut CSOUND);
    pub fn csoundGetVersion() -> c_int;
    pub fn csoundGetAPIVersion() -> c_int;

    // Performance
    pub fn csoundParseOrc(csound: *mut CSOUND, orc: *const c_char) -> *mut TREE;
    pub fn csoundCompileTree(csound: *mut CSOUND, root: *mut TREE) -> c_int;
    pub fn csoundDeleteTree(csound: *mut CSOUND, tree: *mut TREE);
    pub fn csoundCompileOrc(csound: *mut CSOUND, orc: *const c_char) -> c_int;
    pub fn csoundEvalCode(csound: *mut CSOUND, code: *const c_char) -> MYFLT;
    pub fn csoundCompileArgs(csound: *mut CSOUND, argc: c_int, argv: *const *const c_char) -> c_int;
    pub fn csoundStart(csound: *mut CSOUND) -> c_int;
    pub fn csoundCompile(csound: *mut CSOUND, argc: c_int, argv: *const *const c_char) -> c_int;
    pub fn csoundCompileCsd(csound: *mut CSOUND, path: *const c_char) -> c_int;
    pub fn csoundPerform(csound: *mut CSOUND) -> c_int;
    pub fn csoundPerformKsmps(csound: *mut CSOUND) -> c_int;
    pub fn csoundPerformBuffer(csound: *mut CSOUND) -> c_int;
    pub fn csoundStop(csound: *mut CSOUND);
    pub fn csoundCleanup(csound: *mut CSOUND) -> c_int;
    pub fn csoundReset(csound: *mut CSOUND);

    // Attributes
    pub fn csoundGetSr(csound: *mut CSOUND) -> MYFLT;
    pub fn csoundGetKr(csound: *mut CSOUND) -> MYFLT;
    pub fn csoundGetKsmps(csound: *mut CSOUND) -> u32;
    pub fn csoundGetNchnls(csound: *mut CSOUND) -> u32;
    pub fn csoundGetNchnlsInput(csound: *mut CSOUND) -> u32;
    pub fn csoundGet0dBFS(csound: *mut CSOUND) -> MYFLT;
    pub fn csoundGetCurrentTimeSamples(csound: *mut CSOUND) -> i64;
    pub fn csoundGetSizeOfMYFLT() -> c_int;
    pub fn csoundGetHostData(csound: *mut CSOUND) -> *mut c_void;
    pub fn csoundSetHostData(csound: *mut CSOUND, hostData: *mut c_void);
    pub fn csoundSetOption(csound: *mut CSOUND, option: *const c_char) -> c_int;
    pub fn csoundGetDebug(csound: *mut CSOUND) -> c_int;
    pub fn csoundSetDebug(csound: *mut CSOUND, debug: c_int);

    // General input/output
    pub fn csoundGetOutputName(csound: *mut CSOUND) -> *const c_char;
    pub fn csoundSetOutput(
        csound: *mut CSOUND,
        name: *const c_char,
        type_: *const c_char,
        format: *const c_char,
    );
    pub fn csoundSetFileOpenCallback(
        csound: *mut CSOUND,
        callback: Option<csound_file_open_callback>,
    );

    // Score handling
    pub fn csoundReadScore(csound: *mut CSOUND, score: *const c_char) -> c_int;
    pub fn csoundGetScoreTime(csound: *mut CSOUND) -> c_double;
    pub fn csoundIsScorePending(csound: *mut CSOUND) -> c_int;
    pub fn csoundSetScorePending(csound: *mut CSOUND, pending: c_int);
    pub fn csoundGetScoreOffsetSeconds(csound: *mut CSOUND) -> MYFLT;
    pub fn csoundSetScoreOffsetSeconds(csound: *mut CSOUND, time: MYFLT);
    pub fn csoundRewindScore(csound: *mut CSOUND);

    // Messages and text
    pub fn csoundMessage(csound: *mut CSOUND, format: *const c_char, ...);
    pub fn csoundMessageS(csound: *mut CSOUND, attr: c_int, format: *const c_char, ...);
    pub fn csoundSetMessageStringCallback(
        csound: *mut CSOUND,
        callback: Option<csound_message_callback>,
    );
    /// Process-wide; applies to instances created afterwards that have no callback of their own.
    pub fn csoundSetDefaultMessageCallback(callback: Option<csound_default_message_callback>);
    pub fn csoundGetMessageLevel(csound: *mut CSOUND) -> c_int;
    pub fn csoundSetMessageLevel(csound: *mut CSOUND, messageLevel: c_int);
    pub fn csoundCreateMessageBuffer(csound: *mut CSOUND, toStdOut: c_int);
    pub fn csoundGetFirstMessage(csound: *mut CSOUND) -> *const c_char;
    pub fn csoundGetFirstMessageAttr(csound: *mut CSOUND) -> c_int;
    pub fn csoundPopFirstMessage(csound: *mut CSOUND);
    pub fn csoundGetMessageCnt(csound: *mut CSOUND) -> c_int;
    pub fn csoundDestroyMessageBuffer(csound: *mut CSOUND);

    // Channels, control and events
    pub fn csoundListChannels(csound: *mut CSOUND, lst: *mut *mut controlChannelInfo_t) -> c_int;
    pub fn csoundDeleteChannelList(csound: *mut CSOUND, lst: *mut controlChannelInfo_t);
    pub fn csoundSetControlChannelHints(
        csound: *mut CSOUND,
        name: *const c_char,
        hints: controlChannelHints_t,
    ) -> c_int;
    pub fn csoundGetControlChannelHints(
        csound: *mut CSOUND,
        name: *const c_char,
        hints: *mut controlChannelHints_t,
    ) -> c_int;
    pub fn csoundGetControlChannel(
        csound: *mut CSOUND,
        name: *const c_char,
        err: *mut c_int,
    ) -> MYFLT;
    pub fn csoundSetControlChannel(csound: *mut CSOUND, name: *const c_char, val: MYFLT);
    pub fn csoundScoreEvent(
        csound: *mut CSOUND,
        type_: c_char,
        pFields: *const MYFLT,
        numFields: c_long,
    ) -> c_int;
    pub fn csoundInputMessage(csound: *mut CSOUND, message: *const c_char);

    // Tables
    pub fn csoundTableLength(csound: *mut CSOUND, table: c_int) -> c_int;
    pub fn csoundTableGet(csound: *mut CSOUND, table: c_int, index: c_int) -> MYFLT;
    pub fn csoundTableSet(csound: *mut CSOUND, table: c_int, index: c_int, value: MYFLT);

    // Function table display
    pub fn csoundSetIsGraphable(csound: *mut CSOUND, isGraphable: c_int) -> c_int;
    pub fn csoundSetMakeGraphCallback(
        csound: *mut CSOUND,
        callback: Option<csound_make_graph_callback>,
    );
    pub fn csoundSetDrawGraphCallback(csound: *mut CSOUND, callback: Option<csound_graph_callback>);
    pub fn csoundSetKillGraphCallback(csound: *mut CSOUND, callback: Option<csound_graph_callback>);

    // Opcodes
    pub fn csoundNewOpcodeList(csound: *mut CSOUND, opcodelist: *mut *mut opcodeListEntry) -> c_int;
    pub fn csoundDisposeOpcodeList(csound: *mut CSOUND, opcodelist: *mut opcodeListEntry);

    // Miscellaneous
    pub fn csoundGetEnv(csound: *mut CSOUND, name: *const c_char) -> *const c_char;
    pub fn csoundSetGlobalEnv(name: *const c_char, value: *const c_char) -> c_int;
    pub fn csoundListUtilities(csound: *mut CSOUND) -> *mut *mut c_char;
    pub fn csoundDeleteUtilityList(csound: *mut CSOUND, lst: *mut *mut c_char);
    pub fn csoundGetUtilityDescription(
        csound: *mut CSOUND,
        utilName: *const c_char,
    ) -> *const c_char;

    // Debugger
    pub fn csoundDebuggerInit(csound: *mut CSOUND);
    pub fn csoundDebuggerClean(csound: *mut CSOUND);
    pub fn csoundSetInstrumentBreakpoint(csound: *mut CSOUND, instr: MYFLT, skip: c_int);
    pub fn csoundRemoveInstrumentBreakpoint(csound: *mut CSOUND, instr: MYFLT);
    pub fn csoundClearBreakpoints(csound: *mut CSOUND);
    pub fn csoundSetBreakpointCallback(
        csound: *mut CSOUND,
        bkpt_cb: Option<breakpoint_cb_t>,
        userdata: *mut c_void,
    );
    pub fn csoundDebugContinue(csound: *mut CSOUND);
    pub fn csoundDebugStop(csound: *mut CSOUND);
}
